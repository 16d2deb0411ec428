//! Error types for cb-core

use thiserror::Error;

/// cb-core error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("Read access to the contacts store is not granted")]
    PermissionDenied,

    #[error("Contacts store read failed: {0}")]
    Store(String),

    #[error("Change token is no longer valid: {0}")]
    TokenInvalidated(String),

    #[error("Observer registration failed: {0}")]
    Registration(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
