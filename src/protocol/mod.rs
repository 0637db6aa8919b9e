//! Peer rendezvous protocol.
//!
//! Turns a shared queue with optional session partitioning into a
//! duplex channel between exactly two peers that discover each other at
//! runtime.
//!
//! # Protocol Overview
//!
//! Negotiation uses two queues:
//!
//! - the **rendezvous** (root) queue, unpartitioned, carries exactly one
//!   [`Announcement`] per pair
//! - the **session** queue, partitioned by session id, carries all data
//!
//! After the handshake there are two mono-directional sessions. Each peer
//! listens on one partition and sends to the other, while its peer does
//! the flip.
//!
//! ## State Machine
//!
//! | State         | Description                           | Valid Transitions |
//! |---------------|---------------------------------------|-------------------|
//! | `Negotiating` | Handshake running, or failed          | → Ready, Destroyed|
//! | `Ready`       | Ids resolved, data may flow           | → Destroyed       |
//! | `Destroyed`   | Handles released, ids cleared         | (terminal)        |
//!
//! ## Roles
//!
//! | Role        | Rendezvous           | Identity                         |
//! |-------------|----------------------|----------------------------------|
//! | `Initiator` | publishes one record | generates `(local, remote)`      |
//! | `Responder` | consumes one record  | adopts `(remote, local)` of it   |
//!
//! A failed negotiation is never retried here; the owner observes the
//! error event and decides whether to destroy and start over.

mod announcement;
mod identity;
mod negotiation;
mod state;

pub use announcement::Announcement;
pub use identity::SessionIdentity;
pub(crate) use negotiation::Negotiator;
pub use state::NegotiationState;

/// Version tag carried by every announcement
pub const CLIENT_VERSION: u32 = 1;
