//! Two-phase negotiation: announce on the rendezvous queue, then bind to
//! per-session partitions of the session queue.
//!
//! Both roles run the same machine with inverted halves:
//!
//! ```text
//! Initiator                                   Responder
//!    | generate (A, B)                           |
//!    | listen session[A]                         | listen root
//!    |--- root: {local:A, remote:B, v:1} ------->|
//!    | Ready                                     | release root receiver
//!    | release root sender                       | adopt (local:B, remote:A), Ready
//!    |                                           | listen session[B]
//!    |==== session[B] ==========================>|
//!    |<=== session[A] ===========================|
//! ```
//!
//! All transitions happen on tasks spawned on the runtime that created the
//! bus. Every notification is emitted under the state lock and suppressed
//! once the bus is destroyed, so a delivery racing with teardown is a
//! no-op. Session payloads that reach the initiator before its own `Ready`
//! are held back and released right after it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::announcement::Announcement;
use super::identity::SessionIdentity;
use super::state::NegotiationState;
use crate::bus::{BusEvent, EventDispatcher};
use crate::channel::{release, RendezvousChannel, SessionChannel};
use crate::config::Role;
use crate::error::BusError;
use crate::transport::{QueueConnection, QueueReceiver};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Shared negotiation core of one bus.
pub(crate) struct Negotiator {
    role: Role,
    state: Mutex<NegotiationState>,
    /// Written once on `Ready`, cleared on teardown
    identity: RwLock<Option<SessionIdentity>>,
    connection: Arc<dyn QueueConnection>,
    pub(crate) rendezvous: RendezvousChannel,
    pub(crate) session: SessionChannel,
    events: EventDispatcher,
    /// Session deliveries that arrived before `Ready`
    backlog: Mutex<Vec<String>>,
    runtime: Handle,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Negotiator {
    pub(crate) fn new(
        role: Role,
        connection: Arc<dyn QueueConnection>,
        rendezvous: RendezvousChannel,
        session: SessionChannel,
        events: EventDispatcher,
        runtime: Handle,
    ) -> Self {
        Self {
            role,
            state: Mutex::new(NegotiationState::Negotiating),
            identity: RwLock::new(None),
            connection,
            rendezvous,
            session,
            events,
            backlog: Mutex::new(Vec::new()),
            runtime,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn role(&self) -> Role {
        self.role
    }

    pub(crate) fn state(&self) -> NegotiationState {
        *lock(&self.state)
    }

    /// Snapshot of the resolved ids; `None` while negotiating or destroyed
    pub(crate) fn identity(&self) -> Option<SessionIdentity> {
        self.identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Kick off this role's half of the handshake.
    pub(crate) fn start(self: &Arc<Self>) {
        tracing::debug!("starting negotiation as {}", self.role);
        match self.role {
            Role::Initiator => self.start_initiator(),
            Role::Responder => self.start_responder(),
        }
    }

    fn start_initiator(self: &Arc<Self>) {
        let identity = SessionIdentity::generate();

        // listen before announcing so nothing the responder sends is missed
        match self.session.listen(&identity.local) {
            Ok(receiver) => {
                let core = Arc::clone(self);
                self.spawn(async move { core.pump_session(receiver).await });
            },
            Err(e) => {
                self.emit_error(e);
                return;
            },
        }

        let core = Arc::clone(self);
        self.spawn(async move { core.announce(identity).await });
    }

    async fn announce(&self, identity: SessionIdentity) {
        let announcement = Announcement::from_identity(&identity);
        match self.rendezvous.announce(&announcement).await {
            Ok(()) => {
                tracing::debug!(
                    "announced on '{}': local={} remote={}",
                    self.rendezvous.name(),
                    identity.local,
                    identity.remote
                );
                self.become_ready(identity);
                self.rendezvous.release_sender().await;
            },
            Err(e) => {
                tracing::warn!("announcement on '{}' failed: {}", self.rendezvous.name(), e);
                self.emit_error(e);
            },
        }
    }

    fn start_responder(self: &Arc<Self>) {
        match self.rendezvous.listen() {
            Ok(receiver) => {
                let core = Arc::clone(self);
                self.spawn(async move { core.await_announcement(receiver).await });
            },
            Err(e) => self.emit_error(e),
        }
    }

    /// Consume exactly one announcement, then move to the session queue.
    async fn await_announcement(self: Arc<Self>, receiver: Arc<dyn QueueReceiver>) {
        let message = loop {
            match receiver.receive().await {
                Some(Ok(message)) => break message,
                Some(Err(e)) => self.emit_error(e),
                None => {
                    tracing::debug!("rendezvous receiver closed before an announcement arrived");
                    return;
                },
            }
        };

        let parsed = Announcement::from_json(&message.body);

        // single use, whether or not the record was usable
        self.rendezvous.release_receiver().await;

        let identity = match parsed {
            Ok(announcement) => announcement.responder_identity(),
            Err(e) => {
                tracing::warn!("discarding announcement: {}", e);
                self.emit_error(e);
                return;
            },
        };

        if !self.become_ready(identity.clone()) {
            return;
        }

        match self.session.listen(&identity.local) {
            Ok(receiver) => {
                let core = Arc::clone(&self);
                self.spawn(async move { core.pump_session(receiver).await });
            },
            Err(e) => self.emit_error(e),
        }
    }

    /// Surface every session delivery until the receiver closes.
    async fn pump_session(&self, receiver: Arc<dyn QueueReceiver>) {
        while let Some(delivery) = receiver.receive().await {
            match delivery {
                Ok(message) => self.deliver(message.body),
                Err(e) => self.emit_error(e),
            }
        }
        tracing::debug!("session receiver on '{}' closed", self.session.name());
    }

    /// `Negotiating -> Ready`; false if the bus was destroyed meanwhile.
    fn become_ready(&self, identity: SessionIdentity) -> bool {
        let mut state = lock(&self.state);
        if !state.can_transition(NegotiationState::Ready) {
            tracing::debug!("not becoming ready from state {}", *state);
            return false;
        }
        tracing::info!(
            "{} ready: local={} remote={}",
            self.role,
            identity.local,
            identity.remote
        );
        *self
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(identity);
        *state = NegotiationState::Ready;
        self.events.emit(BusEvent::Ready);
        for body in lock(&self.backlog).drain(..) {
            self.events.emit(BusEvent::Message(body));
        }
        true
    }

    /// Surface a session payload, holding it back until `Ready`.
    fn deliver(&self, body: String) {
        let state = lock(&self.state);
        match *state {
            NegotiationState::Negotiating => {
                tracing::debug!("holding session message until ready");
                lock(&self.backlog).push(body);
            },
            NegotiationState::Ready => self.events.emit(BusEvent::Message(body)),
            NegotiationState::Destroyed => {
                tracing::trace!("bus destroyed, dropping session message");
            },
        }
    }

    fn emit_error(&self, err: BusError) {
        tracing::warn!("{} error: {}", self.role, err);
        self.emit(BusEvent::Error(err));
    }

    fn emit(&self, event: BusEvent) {
        let state = lock(&self.state);
        if state.is_terminal() {
            tracing::trace!("bus destroyed, dropping {:?}", event);
            return;
        }
        self.events.emit(event);
    }

    fn spawn<F>(&self, task: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = self.runtime.spawn(task);
        let mut tasks = lock(&self.tasks);
        if self.state().is_terminal() {
            handle.abort();
            return;
        }
        tasks.retain(|t| !t.is_finished());
        tasks.push(handle);
    }

    pub(crate) fn abort_tasks(&self) {
        for task in lock(&self.tasks).drain(..) {
            task.abort();
        }
    }

    /// Release everything this bus owns. Idempotent, never fails.
    pub(crate) async fn shutdown(&self) {
        {
            let mut state = lock(&self.state);
            if *state != NegotiationState::Destroyed {
                tracing::debug!("{} destroying from state {}", self.role, *state);
                *state = NegotiationState::Destroyed;
            }
            *self
                .identity
                .write()
                .unwrap_or_else(PoisonError::into_inner) = None;
            lock(&self.backlog).clear();
        }

        self.session.close().await;
        self.rendezvous.close().await;
        release(
            "transport connection",
            self.connection.is_closed(),
            self.connection.close(),
        )
        .await;

        self.abort_tasks();
    }
}
