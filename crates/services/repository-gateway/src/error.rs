//! Error types for the repository gateway

use crate::session::SessionPhase;

/// Result type alias using the gateway Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while brokering a record/playback session
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or unknown client message
    #[error("{0}")]
    Protocol(String),

    /// Client event that is not allowed in the session's current phase
    #[error("Cannot handle '{event}' while session is {phase}")]
    InvalidTransition {
        /// Inbound message kind
        event: &'static str,
        /// Phase the session was in
        phase: SessionPhase,
    },

    /// A session is already registered for this connection
    #[error("Session already exists for connection {0}")]
    SessionExists(String),

    /// Media server (or the gateway's session limit) has no capacity left
    #[error("Not enough resources: {0}")]
    ResourceExhausted(String),

    /// Storage catalog could not be reached
    #[error("Storage catalog unavailable: {0}")]
    CatalogUnavailable(String),

    /// Any other media server failure
    #[error("Media server error: {0}")]
    EngineFault(String),

    /// Session worker is gone
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Stable machine-readable category sent to clients alongside the message
    pub fn category(&self) -> &'static str {
        match self {
            Error::Protocol(_) | Error::InvalidTransition { .. } | Error::SessionExists(_) => {
                "protocol"
            }
            Error::ResourceExhausted(_) => "resource_exhausted",
            Error::CatalogUnavailable(_) => "catalog_unavailable",
            Error::EngineFault(_) => "engine",
            Error::SessionClosed(_) => "session",
            Error::InvalidConfig(_) => "config",
            Error::WebSocket(_) | Error::Io(_) => "transport",
            Error::Serialization(_) => "internal",
        }
    }

    /// Check if this error means the media server ran out of capacity
    pub fn is_resource_exhausted(&self) -> bool {
        matches!(self, Error::ResourceExhausted(_))
    }

    /// Check if this error was caused by the client misusing the protocol
    pub fn is_protocol_error(&self) -> bool {
        self.category() == "protocol"
    }

    /// Check if this error is handled locally without failing the session
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::CatalogUnavailable(_))
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::WebSocket(err.to_string())
    }
}
