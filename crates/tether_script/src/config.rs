//! Context configuration

use rquickjs::Runtime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Engine heap limits and optional debugger attachment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Heap size cap in bytes.
    pub memory_limit: Option<usize>,
    /// Allocation volume between automatic collection cycles.
    pub gc_threshold: Option<usize>,
    pub max_stack_size: Option<usize>,
    pub debugger: Option<DebuggerConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebuggerConfig {
    pub listen: String,
    #[serde(default)]
    pub wait_on_start: bool,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:9091".to_string(),
            wait_on_start: false,
        }
    }
}

impl ContextConfig {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub(crate) fn apply(&self, runtime: &Runtime) {
        if let Some(limit) = self.memory_limit {
            runtime.set_memory_limit(limit);
        }
        if let Some(threshold) = self.gc_threshold {
            runtime.set_gc_threshold(threshold);
        }
        if let Some(size) = self.max_stack_size {
            runtime.set_max_stack_size(size);
        }
    }
}
