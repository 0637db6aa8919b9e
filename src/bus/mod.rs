//! Symmetric channel facade.
//!
//! [`SymmetricBus`] is the public unit: it owns the negotiation core, the
//! two channel adapters and the transport connection, and exposes a
//! uniform contract regardless of role:
//!
//! - identity accessors, `None` until [`BusEvent::Ready`]
//! - [`SymmetricBus::send`], valid once ready
//! - [`SymmetricBus::destroy`], idempotent teardown from any state
//! - an ordered [`BusEvents`] stream of `Ready` / `Message` / `Error`
//!
//! Construction starts the negotiation immediately; there is no separate
//! connect step.

mod events;

pub use events::{BusEvent, BusEvents};
pub(crate) use events::EventDispatcher;

use std::sync::Arc;

use tokio::runtime::Handle;

use crate::channel::{RendezvousChannel, SessionChannel};
use crate::config::{BusConfig, Role};
use crate::error::{BusError, Result};
use crate::protocol::{NegotiationState, Negotiator, SessionIdentity};
use crate::transport::{Connector, QueueConnection};

/// A two-peer duplex channel negotiated over a shared queue.
///
/// Must be created from within a tokio runtime; negotiation and receive
/// loops run as tasks on that runtime. Dropping the bus aborts those
/// tasks but does not close transport handles, call
/// [`SymmetricBus::destroy`] for that.
pub struct SymmetricBus {
    core: Arc<Negotiator>,
}

impl SymmetricBus {
    /// Connect, open both queues and start negotiating.
    ///
    /// Fails synchronously only for invalid configuration, a missing
    /// runtime, or a transport that refuses the connection or a queue.
    /// Everything after that is reported through the returned events.
    pub fn new(config: &BusConfig, connector: &dyn Connector) -> Result<(Self, BusEvents)> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| {
            BusError::Config("a bus must be created inside a tokio runtime".to_string())
        })?;

        let connection = connector.connect(&config.connection_string)?;
        let channels = RendezvousChannel::open(&*connection, &config.queues.root).and_then(
            |rendezvous| {
                SessionChannel::open(&*connection, &config.queues.session)
                    .map(|session| (rendezvous, session))
            },
        );
        let (rendezvous, session) = match channels {
            Ok(channels) => channels,
            Err(e) => {
                abandon(&runtime, connection);
                return Err(e);
            },
        };

        let (dispatcher, events) = EventDispatcher::channel();
        let core = Arc::new(Negotiator::new(
            config.role,
            connection,
            rendezvous,
            session,
            dispatcher,
            runtime,
        ));
        core.start();

        Ok((Self { core }, events))
    }

    /// Role fixed at construction
    pub fn role(&self) -> Role {
        self.core.role()
    }

    /// Current negotiation state
    pub fn state(&self) -> NegotiationState {
        self.core.state()
    }

    /// Whether the handshake completed and the bus was not destroyed
    pub fn is_ready(&self) -> bool {
        self.state() == NegotiationState::Ready
    }

    /// Partition we listen on; available after [`BusEvent::Ready`]
    pub fn local_session_id(&self) -> Option<String> {
        self.core.identity().map(|id| id.local)
    }

    /// Partition we send to; available after [`BusEvent::Ready`]
    pub fn remote_session_id(&self) -> Option<String> {
        self.core.identity().map(|id| id.remote)
    }

    /// Both ids at once, consistent with each other
    pub fn identity(&self) -> Option<SessionIdentity> {
        self.core.identity()
    }

    /// Transmit `payload` to the peer.
    ///
    /// Fails with [`BusError::NotReady`], without touching the transport,
    /// until the peer's session id is known. Resolves once the transport
    /// acknowledged the message, or with its failure.
    pub async fn send(&self, payload: impl Into<String>) -> Result<()> {
        let identity = self.core.identity().ok_or(BusError::NotReady)?;
        self.core
            .session
            .send(payload.into(), &identity.remote, &identity.local)
            .await
    }

    /// Release every transport handle this bus owns and clear both ids.
    ///
    /// Safe to call repeatedly and from any state. Close failures are
    /// logged and swallowed; the peer is not notified.
    pub async fn destroy(&self) {
        self.core.shutdown().await;
    }
}

impl std::fmt::Debug for SymmetricBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymmetricBus")
            .field("role", &self.role())
            .field("state", &self.state())
            .field("identity", &self.identity())
            .finish()
    }
}

impl Drop for SymmetricBus {
    fn drop(&mut self) {
        self.core.abort_tasks();
    }
}

/// Best-effort close of a connection we could not finish setting up.
fn abandon(runtime: &Handle, connection: Arc<dyn QueueConnection>) {
    runtime.spawn(async move {
        if let Err(e) = connection.close().await {
            tracing::warn!("Failed to close transport connection: {}", e);
        }
    });
}
