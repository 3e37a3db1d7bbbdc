use rquickjs::{Persistent, Value};
use tether_host::{Capability, HostError};
use thiserror::Error;

/// Failure reported at the Context boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BridgeError {
    /// Unrecoverable; the Context refuses further work.
    #[error("fatal: {0}")]
    Fatal(String),

    #[error("{message}")]
    TypeCapability {
        capability: Capability,
        message: String,
    },

    #[error("A global object called {name} already exists")]
    DuplicateGlobal { name: String },

    #[error("In bound method \"{object}.{method}\": {reason}")]
    InvalidMethod {
        object: String,
        method: String,
        reason: String,
    },

    #[error(transparent)]
    ScriptExecution(#[from] ScriptError),

    #[error("dangling handle: {0}")]
    DanglingHandle(String),

    #[error("A global JavaScript object called {name} was not found")]
    GlobalNotFound { name: String },

    #[error("JavaScript global {object} has no method called {method}")]
    MissingMethod { object: String, method: String },

    #[error("wrong number of arguments for '{method}': expected {expected}, got {actual}")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },

    #[error("context is busy on this thread; re-enter through the ScriptAccess handed to host methods")]
    ContextBusy,

    #[error("context has been closed")]
    ContextClosed,
}

impl BridgeError {
    pub fn is_fatal(&self) -> bool {
        matches!(self, BridgeError::Fatal(_) | BridgeError::DanglingHandle(_))
    }

    /// The host error that caused a script failure, if one did.
    pub fn host_cause(&self) -> Option<&HostError> {
        match self {
            BridgeError::ScriptExecution(error) => error.cause.as_ref(),
            _ => None,
        }
    }

    pub(crate) fn into_host_error(self) -> HostError {
        match self {
            BridgeError::ScriptExecution(ScriptError { cause: Some(cause), .. }) => cause,
            other => HostError::Script(other.to_string()),
        }
    }
}

/// An exception raised while running script.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{name}: {message}{}", file_suffix(.file))]
pub struct ScriptError {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub file: Option<String>,
    /// Set when the exception started as a host method failure.
    pub cause: Option<HostError>,
}

fn file_suffix(file: &Option<String>) -> String {
    file.as_deref().map(|f| format!(" ({f})")).unwrap_or_default()
}

impl ScriptError {
    pub fn new(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            message: message.into(),
            stack: None,
            file: None,
            cause: None,
        }
    }

    pub(crate) fn in_file(mut self, file: Option<&str>) -> Self {
        if self.file.is_none() {
            self.file = file.map(str::to_string);
        }
        self
    }
}

/// A host-side failure raised inside a trap, waiting to be reported at the
/// Context boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub(crate) enum PendingError {
    #[error("{type_name} is not {} (required to {operation})", capability.describe())]
    Capability {
        capability: Capability,
        operation: &'static str,
        type_name: String,
    },

    #[error(transparent)]
    Host(HostError),
}

/// A pending error with the exception thrown for it. Only that exception
/// reaching the boundary reports the host cause.
pub(crate) struct ParkedError {
    pub error: PendingError,
    pub thrown: Persistent<Value<'static>>,
}

impl PendingError {
    pub(crate) fn into_bridge_error(self, thrown: ScriptError) -> BridgeError {
        match self {
            PendingError::Capability { capability, .. } => BridgeError::TypeCapability {
                capability,
                message: thrown.message,
            },
            PendingError::Host(cause) => BridgeError::ScriptExecution(ScriptError {
                cause: Some(cause),
                ..thrown
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_error_mentions_file() {
        let error = ScriptError::new("TypeError", "boom").in_file(Some("main.js"));
        assert_eq!(error.to_string(), "TypeError: boom (main.js)");
    }

    #[test]
    fn host_cause_survives_pending_conversion() {
        let pending = PendingError::Host(HostError::message("kaboom"));
        let error = pending.into_bridge_error(ScriptError::new("Error", "kaboom"));

        assert_eq!(error.host_cause(), Some(&HostError::message("kaboom")));
        assert_eq!(
            error.into_host_error(),
            HostError::Message("kaboom".to_string())
        );
    }

    #[test]
    fn capability_message_names_requirement() {
        let pending = PendingError::Capability {
            capability: Capability::Callable,
            operation: "invoke",
            type_name: "Lamp".into(),
        };
        assert_eq!(pending.to_string(), "Lamp is not callable (required to invoke)");
    }
}
