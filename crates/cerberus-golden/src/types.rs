//! Golden-data file formats.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{GoldenError, Result};

/// Captured request half of an HTTP call.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Captured response half of an HTTP call. The content is always fully
/// materialized.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RecordedResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub content: String,
}

/// One request/response pair with its capture timestamp.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct HttpCall {
    pub request: RecordedRequest,
    pub response: RecordedResponse,
    #[serde(default)]
    pub timestamp: String,
}

/// Scenario metadata identifying what produced the recordings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub module: String,
    #[serde(rename = "class", default)]
    pub class_name: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub init_kwargs: serde_json::Value,
    #[serde(default)]
    pub kwargs: serde_json::Value,
    #[serde(rename = "createdAt", default)]
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_type: Option<String>,
}

/// A persisted scenario: metadata plus the ordered recordings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GoldenData {
    pub metadata: Metadata,
    pub recordings: Vec<HttpCall>,
}

impl GoldenData {
    /// Load a golden-data file. The current format is an object with
    /// `metadata`/`recordings`; the legacy format (a bare array of per-call
    /// objects, optionally nested under a `call` key) is accepted
    /// read-only.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&raw)?;

        if let serde_json::Value::Array(entries) = value {
            let mut recordings = Vec::with_capacity(entries.len());
            for entry in entries {
                let call_value = match entry.get("call") {
                    Some(inner) => inner.clone(),
                    None => entry,
                };
                recordings.push(serde_json::from_value(call_value)?);
            }
            return Ok(Self {
                metadata: Metadata::default(),
                recordings,
            });
        }

        serde_json::from_value(value).map_err(GoldenError::from)
    }

    /// Write in the current format, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
