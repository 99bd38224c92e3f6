use thiserror::Error;

/// Errors raised by a dialog host while serving the engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("dialog '{0}' is not registered")]
    DialogNotFound(String),

    #[error("no active dialog instance")]
    NoActiveDialog,

    #[error("state storage error: {0}")]
    Storage(String),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Errors from conversation state stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid conversation id: '{0}'")]
    InvalidKey(String),
}

impl From<StoreError> for HostError {
    fn from(err: StoreError) -> Self {
        HostError::Storage(err.to_string())
    }
}
