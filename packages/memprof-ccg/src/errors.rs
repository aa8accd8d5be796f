//! Error types for memprof-ccg
//!
//! The graph engine itself is pure; errors only surface at the edges
//! (summary import, dot export).

use thiserror::Error;

/// Main error type for memprof-ccg operations
#[derive(Debug, Error)]
pub enum MemProfError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Summary parse error
    #[error("Summary parse error: {0}")]
    Parse(String),

    /// Malformed summary content
    #[error("Summary error: {0}")]
    Summary(String),
}

impl MemProfError {
    /// Create a parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        MemProfError::Parse(msg.into())
    }

    /// Create a summary content error
    pub fn summary(msg: impl Into<String>) -> Self {
        MemProfError::Summary(msg.into())
    }
}

/// Result type alias for memprof-ccg operations
pub type Result<T> = std::result::Result<T, MemProfError>;
