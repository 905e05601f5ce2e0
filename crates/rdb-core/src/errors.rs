use std::time::Duration;

/// Core error type.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// can report collaborator failures uniformly. Content that does not qualify
/// for saving is not an error; see `classifier::RejectReason`.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("collaborator error: {0}")]
    Collaborator(String),

    #[error("{what} timed out after {after:?}")]
    Timeout { what: &'static str, after: Duration },
}

pub type Result<T> = std::result::Result<T, Error>;
