//! Value codecs for persistent backends: string pass-through and JSON
//! round-trip.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CacheError;

pub trait ValueCodec<V>: Send + Sync {
    fn encode(&self, value: &V) -> Result<String, CacheError>;
    fn decode(&self, data: &str) -> Result<V, CacheError>;
}

/// Pass-through codec for string values. Non-string values are rejected at
/// the type level.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl ValueCodec<String> for StringCodec {
    fn encode(&self, value: &String) -> Result<String, CacheError> {
        Ok(value.clone())
    }

    fn decode(&self, data: &str) -> Result<String, CacheError> {
        Ok(data.to_string())
    }
}

/// JSON round-trip codec for any serde-serializable value.
pub struct JsonCodec<V>(PhantomData<fn() -> V>);

impl<V> JsonCodec<V> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<V> Default for JsonCodec<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Serialize + DeserializeOwned> ValueCodec<V> for JsonCodec<V> {
    fn encode(&self, value: &V) -> Result<String, CacheError> {
        Ok(serde_json::to_string(value)?)
    }

    fn decode(&self, data: &str) -> Result<V, CacheError> {
        Ok(serde_json::from_str(data)?)
    }
}
