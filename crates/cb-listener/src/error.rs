//! Error types for cb-listener

use thiserror::Error;

use crate::events::StreamError;

/// Listener error taxonomy
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerError {
    #[error("Read access to contacts is not granted")]
    PermissionDenied,

    #[error("Contacts fetch failed: {0}")]
    TransientFetch(String),

    #[error("Change token invalidated: {0}")]
    TokenInvalidated(String),

    #[error("Change observer registration failed: {0}")]
    ObserverRegistration(String),

    #[error("Listener initialization failed: {0}")]
    Initialization(String),
}

impl ListenerError {
    /// Stable wire code
    pub fn code(&self) -> &'static str {
        match self {
            ListenerError::PermissionDenied => "permission_denied",
            ListenerError::TransientFetch(_) => "fetch_failed",
            ListenerError::TokenInvalidated(_) => "token_invalidated",
            ListenerError::ObserverRegistration(_) => "observer_registration_failed",
            ListenerError::Initialization(_) => "initialization_failed",
        }
    }

    /// Error payload for the subscriber's stream
    pub fn to_stream_error(&self) -> StreamError {
        StreamError {
            code: self.code().to_string(),
            message: self.to_string(),
        }
    }
}

impl From<cb_core::Error> for ListenerError {
    fn from(e: cb_core::Error) -> Self {
        match e {
            cb_core::Error::PermissionDenied => ListenerError::PermissionDenied,
            cb_core::Error::TokenInvalidated(reason) => ListenerError::TokenInvalidated(reason),
            cb_core::Error::Registration(reason) => ListenerError::ObserverRegistration(reason),
            cb_core::Error::Store(reason) => ListenerError::TransientFetch(reason),
            other => ListenerError::TransientFetch(other.to_string()),
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ListenerError>;
