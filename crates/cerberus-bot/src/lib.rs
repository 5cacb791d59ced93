//! Message pipeline orchestrator and spam decision engine.
//!
//! Inbound messages are validated into envelopes, serialized per chat,
//! run through the spam decision engine, then dispatched to the ordered
//! handler chain. The chat-platform transport is an external collaborator
//! behind the [`platform::Platform`] trait.

pub mod context;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod pipeline;
pub mod platform;
pub mod spam;
#[cfg(test)]
pub(crate) mod testutil;
pub mod wizard;

pub use context::BotContext;
pub use envelope::{
    ChatKind, ChatRef, EntityKind, InboundMessage, MessageEntity, MessageEnvelope, UserRef,
};
pub use error::BotError;
pub use pipeline::{Dispatcher, Pipeline};
pub use platform::{Platform, SentMessage};
pub use spam::{PretrainStats, SpamEngine, SpamVerdict};
