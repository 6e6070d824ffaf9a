pub mod file_store;
pub mod store;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stage of a context-collection session. `Complete` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Collecting,
    Complete,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Collecting => write!(f, "collecting"),
            Stage::Complete => write!(f, "complete"),
        }
    }
}

/// The in-progress state of gathering a context blob via conversation.
/// One session per account, keyed by email. The field mapping keeps
/// insertion order for keys the model discovers dynamically.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextSession {
    pub email: String,
    #[serde(default)]
    pub collected_data: Map<String, Value>,
    pub stage: Stage,
    pub last_updated: chrono::DateTime<chrono::Utc>,
}

impl ContextSession {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            collected_data: Map::new(),
            stage: Stage::Collecting,
            last_updated: chrono::Utc::now(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stage == Stage::Complete
    }

    /// Merge a field-mapping delta: last write wins per key, keys absent
    /// from the delta are untouched, nothing is ever deleted.
    pub fn merge(&mut self, delta: &Map<String, Value>) {
        for (key, value) in delta {
            self.collected_data.insert(key.clone(), value.clone());
        }
    }
}
