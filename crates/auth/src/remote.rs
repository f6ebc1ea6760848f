use serde::Serialize;
use thiserror::Error;

/// Failure reported by a remote access-control operation.
///
/// The remote layer only ever gives us text. Classification of that text into
/// operator-facing messages happens in the provisioning error normalizer.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[error("{message}")]
pub struct RemoteError {
    message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
