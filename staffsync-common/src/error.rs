//! Common error types for staffsync
//!
//! The remote store, the cache and the status store all report failures
//! through this one enum. It is `Clone` so a single failed fetch can be
//! handed to every caller that was waiting on it.

use thiserror::Error;

/// Common result type for staffsync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across staffsync crates
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Id unknown to the store (update/delete only)
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected payload (bad field values)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Payload conflicts with existing state (e.g. duplicate non-closed link)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Network or store unavailable
    #[error("Transport error: {0}")]
    Transport(String),

    /// Status persistence failure (wraps sqlx::Error text)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Discriminant of [`Error`] for callers that want to branch on the kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Conflict,
    Transport,
    Persistence,
    Config,
}

impl Error {
    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Validation(_) => ErrorKind::Validation,
            Error::Conflict(_) => ErrorKind::Conflict,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Persistence(_) => ErrorKind::Persistence,
            Error::Config(_) => ErrorKind::Config,
        }
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        Error::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(Error::NotFound("a1".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::Conflict("dup".into()).kind(), ErrorKind::Conflict);
        assert_eq!(Error::Transport("down".into()).kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_display_includes_message() {
        let err = Error::Validation("allocation_pct must be <= 100".into());
        assert_eq!(err.to_string(), "Validation error: allocation_pct must be <= 100");
    }

    #[test]
    fn test_io_error_maps_to_config() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert_eq!(err.kind(), ErrorKind::Config);
    }
}
