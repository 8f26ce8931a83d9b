/// Canonical error type used across all modules.
///
/// Only transport-level failures reach the consumer's output channel as
/// terminal signals. Frame-level and tool-level errors are contained where
/// they occur (skipped frames, error-shaped tool results) and never become a
/// `ChatError`.
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Upstream error: status={status}, body={body}")]
    Upstream { status: u16, body: String },
    #[error("Transport error: {0}")]
    Transport(String),
}

impl ChatError {
    /// Upstream HTTP status code, when this error carries one.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            ChatError::Upstream { status, .. } => Some(*status),
            _ => None,
        }
    }
}
