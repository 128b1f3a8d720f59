//! Error types for Drydock

use thiserror::Error;

/// Main error type for Drydock
#[derive(Error, Debug)]
pub enum Error {
    #[error("Provider auth error: {0}")]
    ProviderAuth(String),

    #[error("Provider provision error: {0}")]
    ProviderProvision(String),

    #[error("Provider lookup error: {0}")]
    ProviderLookup(String),

    #[error("Precondition violation: {0}")]
    PreconditionViolation(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Missing identity: {0}")]
    MissingIdentity(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ProviderLookup("instance i-123 unknown".to_string());
        assert_eq!(
            err.to_string(),
            "Provider lookup error: instance i-123 unknown"
        );

        let err = Error::PreconditionViolation("host is terminated".to_string());
        assert!(err.to_string().starts_with("Precondition violation"));
    }
}
