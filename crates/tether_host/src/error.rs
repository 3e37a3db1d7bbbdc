use thiserror::Error;

/// Failure raised by host code while serving a call from script.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    #[error("{0}")]
    Message(String),

    #[error("wrong number of arguments for '{method}': expected {expected}, got {actual}")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("{type_name} does not support '{operation}'")]
    Unsupported {
        operation: String,
        type_name: String,
    },

    /// A re-entrant call back into script failed.
    #[error("script error: {0}")]
    Script(String),
}

impl HostError {
    pub fn message(text: impl Into<String>) -> Self {
        HostError::Message(text.into())
    }

    pub fn unsupported(operation: &str, type_name: &str) -> Self {
        HostError::Unsupported {
            operation: operation.to_string(),
            type_name: type_name.to_string(),
        }
    }
}
