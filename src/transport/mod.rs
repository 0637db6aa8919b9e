//! Queue transport abstraction.
//!
//! The bus never talks to a message broker directly. Everything it needs
//! from one is captured by the object-safe traits in this module:
//!
//! ```text
//! Connector ──connect──> QueueConnection ──open_queue──> QueueClient
//!                                                           │
//!                                   ┌───────────────────────┴──────┐
//!                                   ▼                              ▼
//!                             QueueSender                    QueueReceiver
//!                          (async send + ack)     (receive-and-delete, optional session)
//! ```
//!
//! Every handle reports whether it is closed, and every `close()` is
//! idempotent and individually awaitable.
//!
//! # Backends
//!
//! - [`memory::MemoryBroker`]: in-process broker, used for tests and for
//!   pairing two buses inside one process.

pub mod memory;

pub use memory::{MemoryBroker, MemoryConnection};

use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A message as it travels through a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMessage {
    /// Opaque payload
    pub body: String,
    /// Destination partition (session queues only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Partition the recipient should answer on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_session_id: Option<String>,
}

impl QueueMessage {
    /// Create an unpartitioned message
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            session_id: None,
            reply_to_session_id: None,
        }
    }

    /// Address the message to a session partition
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Set the reply-to partition
    pub fn with_reply_to(mut self, session_id: impl Into<String>) -> Self {
        self.reply_to_session_id = Some(session_id.into());
        self
    }
}

/// Creates live connections from a connection string.
pub trait Connector: Send + Sync {
    /// Connect to the transport described by `connection_string`.
    fn connect(&self, connection_string: &str) -> Result<Arc<dyn QueueConnection>>;
}

/// A live transport connection.
pub trait QueueConnection: Send + Sync {
    /// Open a handle on the named queue.
    fn open_queue(&self, name: &str) -> Result<Arc<dyn QueueClient>>;

    /// Close the connection. Idempotent.
    fn close(&self) -> BoxFuture<'_, Result<()>>;

    /// Whether [`QueueConnection::close`] has completed.
    fn is_closed(&self) -> bool;
}

/// A handle on one named queue.
pub trait QueueClient: Send + Sync {
    /// Queue name
    fn name(&self) -> &str;

    /// Create a send handle.
    fn create_sender(&self) -> Result<Arc<dyn QueueSender>>;

    /// Create a receive-and-delete handle.
    ///
    /// With `Some(session)` only messages addressed to that partition are
    /// delivered; with `None` only unpartitioned messages are.
    fn create_receiver(&self, session: Option<&str>) -> Result<Arc<dyn QueueReceiver>>;

    /// Close the queue handle. Idempotent.
    fn close(&self) -> BoxFuture<'_, Result<()>>;

    /// Whether [`QueueClient::close`] has completed.
    fn is_closed(&self) -> bool;
}

/// Send half of a queue.
pub trait QueueSender: Send + Sync {
    /// Publish one message; resolves once the transport acknowledged it.
    fn send(&self, message: QueueMessage) -> BoxFuture<'_, Result<()>>;

    /// Close the sender. Idempotent.
    fn close(&self) -> BoxFuture<'_, Result<()>>;

    /// Whether the sender is closed.
    fn is_closed(&self) -> bool;
}

/// Receive half of a queue.
pub trait QueueReceiver: Send + Sync {
    /// Wait for the next delivery.
    ///
    /// Returns `Some(Ok(_))` for a message (already removed from the
    /// queue), `Some(Err(_))` for a transport-reported receive error, and
    /// `None` once the receiver has been closed. A pending call must
    /// resolve to `None` when the receiver is closed concurrently.
    fn receive(&self) -> BoxFuture<'_, Option<Result<QueueMessage>>>;

    /// Close the receiver. Idempotent.
    fn close(&self) -> BoxFuture<'_, Result<()>>;

    /// Whether the receiver is closed.
    fn is_closed(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_message_builder() {
        let msg = QueueMessage::new("ping").with_session("b").with_reply_to("a");
        assert_eq!(msg.body, "ping");
        assert_eq!(msg.session_id.as_deref(), Some("b"));
        assert_eq!(msg.reply_to_session_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_queue_message_json_omits_empty_fields() {
        let json = serde_json::to_string(&QueueMessage::new("hi")).unwrap();
        assert_eq!(json, r#"{"body":"hi"}"#);
    }
}
