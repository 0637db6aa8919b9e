//! # Symbus - Symmetric Bus over Shared Message Queues
//!
//! Turns a message-queue substrate that only offers named queues and
//! optional session partitioning into a bidirectional, addressable channel
//! between exactly two peers that find each other at runtime.
//!
//! ## Features
//!
//! - **Dynamic rendezvous**: peers need no prior knowledge of each other's address
//! - **Session partitioning**: unrelated pairs share one physical data queue without cross-talk
//! - **Symmetric API**: both roles expose the same send / destroy / events contract
//! - **Pluggable transport**: any broker implementing [`transport`]'s traits, plus an in-process one
//!
//! ## Protocol Overview
//!
//! ```text
//! Initiator                 root queue                 Responder
//!    |                          |                          |
//!    |-- {local:A, remote:B} -->|------------------------->|  announce (once)
//!    |                          |                          |
//!    |                    session queue                    |
//!    |======== session B ==================================>|  data
//!    |<======= session A ===================================|
//! ```
//!
//! ### State Machine
//!
//! ```text
//!                   announced / announcement consumed
//!     [Negotiating] ─────────────────────────────────> [Ready]
//!         │                                               │
//!         │ destroy()                                     │ destroy()
//!         v                                               v
//!     [Destroyed] <───────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use symbus::{BusConfig, BusEvent, MemoryBroker, SymmetricBus};
//!
//! let broker = MemoryBroker::new();
//! let (server, mut server_events) =
//!     SymmetricBus::new(&BusConfig::initiator("memory://demo", "announce", "session"), &broker)?;
//! let (client, mut client_events) =
//!     SymmetricBus::new(&BusConfig::responder("memory://demo", "announce", "session"), &broker)?;
//!
//! while let Some(event) = client_events.recv().await {
//!     match event {
//!         BusEvent::Ready => client.send("hello i'm a client").await?,
//!         BusEvent::Message(data) => println!("client got {data}"),
//!         BusEvent::Error(e) => eprintln!("client error: {e}"),
//!     }
//! }
//!
//! server.destroy().await;
//! client.destroy().await;
//! ```
//!
//! ## Modules
//!
//! - [`bus`]: The [`SymmetricBus`] facade and its notifications
//! - [`protocol`]: Announcement record, identities, negotiation states
//! - [`channel`]: Rendezvous and session queue adapters
//! - [`transport`]: Transport contract and the in-memory broker
//! - [`config`]: Configuration management
//! - [`error`]: Error types and result aliases

pub mod bus;
pub mod channel;
pub mod config;
pub mod error;
pub mod protocol;
pub mod transport;

// Re-exports for convenience
pub use bus::{BusEvent, BusEvents, SymmetricBus};
pub use config::{BusConfig, QueueConfig, Role};
pub use error::{BusError, Result};
pub use protocol::{Announcement, NegotiationState, SessionIdentity, CLIENT_VERSION};
pub use transport::{Connector, MemoryBroker, QueueMessage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
