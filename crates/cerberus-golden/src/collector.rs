//! Generic golden-data collector: reads scenario specs from JSON, runs each
//! target operation under a recording session, and saves one golden file
//! per scenario.
//!
//! Targets are resolved through an explicit [`OperationRegistry`] keyed by
//! `module.Class.method`; unknown targets fail the scenario.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use crate::error::{GoldenError, Result};
use crate::record::Recorder;
use crate::transport::HttpTransport;
use crate::types::Metadata;

/// One scenario from the collector input file.
#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioSpec {
    pub description: String,
    pub module: String,
    #[serde(rename = "class")]
    pub class_name: String,
    pub method: String,
    #[serde(default)]
    pub init_kwargs: serde_json::Value,
    #[serde(default)]
    pub kwargs: serde_json::Value,
}

impl ScenarioSpec {
    pub fn target(&self) -> String {
        format!("{}.{}.{}", self.module, self.class_name, self.method)
    }
}

pub type OpFuture = Pin<Box<dyn Future<Output = Result<String>> + Send>>;

/// A collectable operation: (init_kwargs, kwargs, transport) → result-type
/// name. The operation constructs its client with the given transport so
/// all of its traffic is recorded.
pub type CollectOp =
    Box<dyn Fn(serde_json::Value, serde_json::Value, Arc<dyn HttpTransport>) -> OpFuture + Send + Sync>;

/// Static registry of collectable operations, the explicit-registration
/// counterpart of a dynamic module import.
#[derive(Default)]
pub struct OperationRegistry {
    ops: HashMap<String, CollectOp>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: impl Into<String>, op: CollectOp) {
        self.ops.insert(target.into(), op);
    }

    pub fn get(&self, target: &str) -> Option<&CollectOp> {
        self.ops.get(target)
    }

    pub fn targets(&self) -> Vec<String> {
        self.ops.keys().cloned().collect()
    }
}

/// Replace `"${VAR}"` strings with the value of the environment variable
/// `VAR`, recursing into objects and arrays. Unset variables are left as
/// the placeholder.
pub fn substitute_env_vars(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::String(s) => {
            if let Some(name) = s.strip_prefix("${").and_then(|rest| rest.strip_suffix('}')) {
                match std::env::var(name) {
                    Ok(resolved) => serde_json::Value::String(resolved),
                    Err(_) => value.clone(),
                }
            } else {
                value.clone()
            }
        }
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute_env_vars(v)))
                .collect(),
        ),
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(substitute_env_vars).collect())
        }
        other => other.clone(),
    }
}

/// Convert a scenario description into a safe output filename.
pub fn sanitize_filename(text: &str) -> String {
    let mut safe: String = text
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == ' ' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    while safe.contains("__") {
        safe = safe.replace("__", "_");
    }
    let capped: String = safe.chars().take(100).collect();
    capped.trim_matches(&['_', ' '][..]).to_string()
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CollectionSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Run every scenario and write one golden file per success. A scenario
/// failure is logged and counted, not fatal to the batch.
pub async fn run_collection(
    scenarios: &[ScenarioSpec],
    output_dir: &Path,
    secrets: &[String],
    registry: &OperationRegistry,
) -> Result<CollectionSummary> {
    std::fs::create_dir_all(output_dir)?;

    let mut summary = CollectionSummary {
        total: scenarios.len(),
        ..Default::default()
    };

    for scenario in scenarios {
        info!(description = %scenario.description, "collecting scenario");
        match collect_one(scenario, output_dir, secrets, registry).await {
            Ok(()) => summary.succeeded += 1,
            Err(e) => {
                error!(description = %scenario.description, error = %e, "scenario failed");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

async fn collect_one(
    scenario: &ScenarioSpec,
    output_dir: &Path,
    secrets: &[String],
    registry: &OperationRegistry,
) -> Result<()> {
    let target = scenario.target();
    let op = registry
        .get(&target)
        .ok_or_else(|| GoldenError::UnknownTarget(target.clone()))?;

    let init_kwargs = substitute_env_vars(&scenario.init_kwargs);
    let recorder = Recorder::new(secrets.to_vec());

    let result_type = op(init_kwargs, scenario.kwargs.clone(), recorder.transport())
        .await
        .map_err(|e| GoldenError::ScenarioFailed(e.to_string()))?;

    let filename = format!("{}.json", sanitize_filename(&scenario.description));
    recorder.save_golden_data(
        &output_dir.join(filename),
        Metadata {
            name: None,
            description: scenario.description.clone(),
            module: scenario.module.clone(),
            class_name: scenario.class_name.clone(),
            method: scenario.method.clone(),
            // Store the original ${VAR} placeholders, never resolved
            // secrets.
            init_kwargs: scenario.init_kwargs.clone(),
            kwargs: scenario.kwargs.clone(),
            created_at: Utc::now().to_rfc3339(),
            result_type: Some(result_type),
        },
    )
}
