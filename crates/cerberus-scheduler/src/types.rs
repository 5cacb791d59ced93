use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Handler function a fired task is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskFunction {
    DeleteMessage,
}

impl TaskFunction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskFunction::DeleteMessage => "delete_message",
        }
    }
}

impl fmt::Display for TaskFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delete_message" => Ok(TaskFunction::DeleteMessage),
            other => Err(format!("unknown task function: {other}")),
        }
    }
}

/// One delayed task row. `payload` holds the handler's keyword arguments
/// as JSON (e.g. chat and message ids for a delete).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelayedTask {
    pub id: String,
    pub fire_at: String,
    pub function: TaskFunction,
    pub payload: serde_json::Value,
    pub created_at: String,
}
