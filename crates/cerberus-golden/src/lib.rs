//! Deterministic HTTP record/replay ("golden data").
//!
//! Every HTTP-using client takes an [`HttpTransport`]; recording and replay
//! wrap that transport explicitly instead of patching any global client
//! state. Recorded scenarios are masked and persisted as single JSON
//! documents, then replayed by content-based request matching.

pub mod collector;
pub mod error;
pub mod masker;
pub mod record;
pub mod replay;
pub mod transport;
pub mod types;

pub use collector::{run_collection, CollectionSummary, OperationRegistry, ScenarioSpec};
pub use error::GoldenError;
pub use masker::SecretMasker;
pub use record::{Recorder, RecordingTransport};
pub use replay::ReplayTransport;
pub use transport::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use types::{GoldenData, HttpCall, Metadata, RecordedRequest, RecordedResponse};
