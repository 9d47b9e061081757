// src/error.rs
// Standardized error types and the tool-status taxonomy

use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication required: {0}")]
    Unauthorized(String),

    #[error("Apify API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("schema compilation error: {0}")]
    SchemaCompile(String),

    #[error("task state error: {0}")]
    TaskState(String),

    #[error("call cancelled")]
    Cancelled,

    /// Invariant violation: a registry entry whose kind the dispatcher does
    /// not recognize. Surfaces as an MCP invalid-params error.
    #[error("unknown tool type for '{0}'")]
    UnknownToolType(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("unknown error: {0}")]
    Other(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// Convenience type alias for Result using ServerError
pub type Result<T> = std::result::Result<T, ServerError>;

impl From<String> for ServerError {
    fn from(s: String) -> Self {
        ServerError::Other(s)
    }
}

impl From<tokio::task::JoinError> for ServerError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            ServerError::Cancelled
        } else {
            ServerError::Other(err.to_string())
        }
    }
}

/// Unified outcome of a tool call, reported in telemetry and used to shape
/// the response. `SoftFail` is returned as content with `isError`; `Aborted`
/// produces no response at all per the MCP cancellation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolStatus {
    Succeeded,
    SoftFail,
    Failed,
    Aborted,
}

impl ToolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolStatus::Succeeded => "succeeded",
            ToolStatus::SoftFail => "soft_fail",
            ToolStatus::Failed => "failed",
            ToolStatus::Aborted => "aborted",
        }
    }
}

impl ServerError {
    /// Classify an error into the tool-status taxonomy.
    ///
    /// User-caused failures (4xx, validation, not-found) are soft: the client
    /// sees them as content and can correct the next call. Everything else is
    /// a platform failure, except cancellation which maps to `Aborted`.
    pub fn tool_status(&self) -> ToolStatus {
        match self {
            ServerError::Cancelled => ToolStatus::Aborted,
            ServerError::InvalidInput(_)
            | ServerError::NotFound(_)
            | ServerError::Unauthorized(_) => ToolStatus::SoftFail,
            ServerError::Api { status, .. } if (400..500).contains(status) => ToolStatus::SoftFail,
            ServerError::Http(e) if e.status().is_some_and(|s| s.is_client_error()) => {
                ToolStatus::SoftFail
            }
            _ => ToolStatus::Failed,
        }
    }
}
