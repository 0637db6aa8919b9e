//! Symmetric bus error types.
//!
//! # Propagation
//!
//! Errors reach the caller through two different paths:
//!
//! - **Synchronous**: [`BusError::NotReady`] and [`BusError::Config`] are
//!   returned directly from the call that violated a local precondition.
//! - **Notification**: transport and decode failures raised while the
//!   negotiation or a receive loop is running are delivered as
//!   [`crate::bus::BusEvent::Error`], never returned into an unrelated
//!   call stack.
//!
//! Teardown swallows every error (see [`crate::SymmetricBus::destroy`]).

use thiserror::Error;

/// Symmetric bus errors.
#[derive(Error, Debug)]
pub enum BusError {
    /// `send` was called before the peer's session id was resolved,
    /// or after the bus was destroyed.
    #[error("Not ready to send")]
    NotReady,

    /// The underlying queue transport reported a failure
    /// (publish, receive, open or close).
    #[error("Transport error: {0}")]
    Transport(String),

    /// The announcement on the rendezvous queue could not be decoded
    /// or carried unusable identifiers.
    #[error("Malformed announcement: {0}")]
    MalformedAnnouncement(String),

    /// Invalid construction configuration.
    #[error("Config error: {0}")]
    Config(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BusError {
    /// Shorthand for a transport failure with a formatted message.
    pub fn transport(msg: impl Into<String>) -> Self {
        BusError::Transport(msg.into())
    }

    /// True for failures that originate in the transport rather than locally.
    pub fn is_transport(&self) -> bool {
        matches!(self, BusError::Transport(_) | BusError::Io(_))
    }
}

/// Result type alias for bus operations
pub type Result<T> = std::result::Result<T, BusError>;

impl From<toml::de::Error> for BusError {
    fn from(err: toml::de::Error) -> Self {
        BusError::Config(err.to_string())
    }
}
