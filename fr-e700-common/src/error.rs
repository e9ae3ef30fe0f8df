use thiserror::Error;

/// Common error type for the FR-E700 monitor.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using the common Error.
pub type Result<T> = std::result::Result<T, Error>;
