//! In-process queue transport.
//!
//! A [`MemoryBroker`] owns a namespace of named queues. Every connection
//! made through it shares that namespace, so two buses connected to the
//! same broker can negotiate with each other exactly as they would over a
//! networked broker.
//!
//! Semantics match the contract in [`super`]:
//!
//! - competing consumers: each message is delivered to one receiver
//! - receive-and-delete: a delivered message is gone from the queue
//! - session partitioning: a receiver bound to a session only sees
//!   messages addressed to it; an unbound receiver only sees
//!   unaddressed messages
//! - closing a connection closes its queues, closing a queue closes its
//!   senders and receivers
//!
//! Fault injection ([`MemoryBroker::fail_next_send`],
//! [`MemoryBroker::fail_next_receive`]) makes the next matching operation
//! fail once with [`BusError::Transport`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::BoxFuture;
use tokio::sync::Notify;

use super::{Connector, QueueClient, QueueConnection, QueueMessage, QueueReceiver, QueueSender};
use crate::error::{BusError, Result};

/// Connection string scheme accepted by [`MemoryBroker`]
pub const MEMORY_SCHEME: &str = "memory://";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Closed flag shared by a handle and everything opened from it.
#[derive(Default)]
struct Lifecycle {
    closed: AtomicBool,
    notify: Notify,
    children: Mutex<Vec<Arc<Lifecycle>>>,
}

impl Lifecycle {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Register a child that closes together with `self`.
    fn spawn_child(&self) -> Result<Arc<Lifecycle>> {
        let mut children = lock(&self.children);
        if self.is_closed() {
            return Err(BusError::transport("handle is closed"));
        }
        children.retain(|c| !c.is_closed());
        let child = Arc::new(Lifecycle::default());
        children.push(Arc::clone(&child));
        Ok(child)
    }

    fn close(&self) {
        let children = {
            let mut children = lock(&self.children);
            self.closed.store(true, Ordering::SeqCst);
            std::mem::take(&mut *children)
        };
        self.notify.notify_waiters();
        for child in children {
            child.close();
        }
    }
}

/// Shared state of one named queue.
struct QueueState {
    messages: Mutex<VecDeque<QueueMessage>>,
    arrived: Notify,
    fail_next_send: AtomicBool,
    fail_next_receive: AtomicBool,
    sent: AtomicU64,
}

impl QueueState {
    fn new() -> Self {
        Self {
            messages: Mutex::new(VecDeque::new()),
            arrived: Notify::new(),
            fail_next_send: AtomicBool::new(false),
            fail_next_receive: AtomicBool::new(false),
            sent: AtomicU64::new(0),
        }
    }

    fn push(&self, message: QueueMessage) {
        lock(&self.messages).push_back(message);
        self.sent.fetch_add(1, Ordering::SeqCst);
        self.arrived.notify_waiters();
    }

    /// Remove and return the oldest message for `session`.
    fn take(&self, session: Option<&str>) -> Option<QueueMessage> {
        let mut messages = lock(&self.messages);
        let pos = messages
            .iter()
            .position(|m| m.session_id.as_deref() == session)?;
        messages.remove(pos)
    }

    fn pending(&self, session: Option<&str>) -> usize {
        lock(&self.messages)
            .iter()
            .filter(|m| m.session_id.as_deref() == session)
            .count()
    }
}

#[derive(Default)]
struct BrokerInner {
    queues: Mutex<HashMap<String, Arc<QueueState>>>,
    connections: Mutex<Vec<Arc<Lifecycle>>>,
}

impl BrokerInner {
    fn queue(&self, name: &str) -> Arc<QueueState> {
        let mut queues = lock(&self.queues);
        Arc::clone(
            queues
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(QueueState::new())),
        )
    }
}

/// In-process message broker.
///
/// Cloning is cheap and yields a handle on the same namespace.
#[derive(Clone, Default)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Create an empty broker
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect directly, without going through [`Connector`]
    pub fn connection(&self) -> MemoryConnection {
        let lifecycle = Arc::new(Lifecycle::default());
        let mut connections = lock(&self.inner.connections);
        connections.retain(|c| !c.is_closed());
        connections.push(Arc::clone(&lifecycle));
        drop(connections);
        MemoryConnection {
            broker: Arc::clone(&self.inner),
            lifecycle,
        }
    }

    /// Make the next `send` on `queue` fail once
    pub fn fail_next_send(&self, queue: &str) {
        self.inner
            .queue(queue)
            .fail_next_send
            .store(true, Ordering::SeqCst);
    }

    /// Make the next `receive` on `queue` report an error once
    pub fn fail_next_receive(&self, queue: &str) {
        let state = self.inner.queue(queue);
        state.fail_next_receive.store(true, Ordering::SeqCst);
        state.arrived.notify_waiters();
    }

    /// Messages waiting on `queue` for the given partition
    pub fn pending(&self, queue: &str, session: Option<&str>) -> usize {
        self.inner.queue(queue).pending(session)
    }

    /// Messages accepted by `queue` since the broker was created
    pub fn sent_count(&self, queue: &str) -> u64 {
        self.inner.queue(queue).sent.load(Ordering::SeqCst)
    }

    /// Connections that have not been closed yet
    pub fn open_connections(&self) -> usize {
        lock(&self.inner.connections)
            .iter()
            .filter(|c| !c.is_closed())
            .count()
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("queues", &lock(&self.inner.queues).len())
            .field("open_connections", &self.open_connections())
            .finish()
    }
}

impl Connector for MemoryBroker {
    fn connect(&self, connection_string: &str) -> Result<Arc<dyn QueueConnection>> {
        if !connection_string.starts_with(MEMORY_SCHEME) {
            return Err(BusError::transport(format!(
                "unsupported connection string '{connection_string}', expected {MEMORY_SCHEME}..."
            )));
        }
        tracing::debug!("memory transport connected: {}", connection_string);
        Ok(Arc::new(self.connection()))
    }
}

/// Connection to a [`MemoryBroker`].
pub struct MemoryConnection {
    broker: Arc<BrokerInner>,
    lifecycle: Arc<Lifecycle>,
}

impl QueueConnection for MemoryConnection {
    fn open_queue(&self, name: &str) -> Result<Arc<dyn QueueClient>> {
        let lifecycle = self.lifecycle.spawn_child()?;
        Ok(Arc::new(MemoryQueue {
            name: name.to_string(),
            state: self.broker.queue(name),
            lifecycle,
        }))
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.lifecycle.close();
            Ok(())
        })
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }
}

struct MemoryQueue {
    name: String,
    state: Arc<QueueState>,
    lifecycle: Arc<Lifecycle>,
}

impl QueueClient for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn create_sender(&self) -> Result<Arc<dyn QueueSender>> {
        let lifecycle = self
            .lifecycle
            .spawn_child()
            .map_err(|_| BusError::transport(format!("queue '{}' is closed", self.name)))?;
        Ok(Arc::new(MemorySender {
            queue: self.name.clone(),
            state: Arc::clone(&self.state),
            lifecycle,
        }))
    }

    fn create_receiver(&self, session: Option<&str>) -> Result<Arc<dyn QueueReceiver>> {
        let lifecycle = self
            .lifecycle
            .spawn_child()
            .map_err(|_| BusError::transport(format!("queue '{}' is closed", self.name)))?;
        Ok(Arc::new(MemoryReceiver {
            queue: self.name.clone(),
            session: session.map(str::to_string),
            state: Arc::clone(&self.state),
            lifecycle,
        }))
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.lifecycle.close();
            Ok(())
        })
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }
}

struct MemorySender {
    queue: String,
    state: Arc<QueueState>,
    lifecycle: Arc<Lifecycle>,
}

impl QueueSender for MemorySender {
    fn send(&self, message: QueueMessage) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.lifecycle.is_closed() {
                return Err(BusError::transport(format!(
                    "sender on '{}' is closed",
                    self.queue
                )));
            }
            if self.state.fail_next_send.swap(false, Ordering::SeqCst) {
                return Err(BusError::transport(format!(
                    "send to '{}' rejected",
                    self.queue
                )));
            }
            self.state.push(message);
            Ok(())
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.lifecycle.close();
            Ok(())
        })
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }
}

struct MemoryReceiver {
    queue: String,
    session: Option<String>,
    state: Arc<QueueState>,
    lifecycle: Arc<Lifecycle>,
}

impl QueueReceiver for MemoryReceiver {
    fn receive(&self) -> BoxFuture<'_, Option<Result<QueueMessage>>> {
        Box::pin(async move {
            loop {
                let arrived = self.state.arrived.notified();
                let closed = self.lifecycle.notify.notified();
                tokio::pin!(arrived, closed);
                arrived.as_mut().enable();
                closed.as_mut().enable();

                if self.lifecycle.is_closed() {
                    return None;
                }
                if self.state.fail_next_receive.swap(false, Ordering::SeqCst) {
                    return Some(Err(BusError::transport(format!(
                        "receive from '{}' failed",
                        self.queue
                    ))));
                }
                if let Some(message) = self.state.take(self.session.as_deref()) {
                    return Some(Ok(message));
                }

                tokio::select! {
                    () = arrived => {}
                    () = closed => {}
                }
            }
        })
    }

    fn close(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.lifecycle.close();
            Ok(())
        })
    }

    fn is_closed(&self) -> bool {
        self.lifecycle.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn open(broker: &MemoryBroker, queue: &str) -> Arc<dyn QueueClient> {
        broker.connection().open_queue(queue).unwrap()
    }

    #[tokio::test]
    async fn test_receive_and_delete() {
        let broker = MemoryBroker::new();
        let queue = open(&broker, "announce");
        let sender = queue.create_sender().unwrap();
        let receiver = queue.create_receiver(None).unwrap();

        sender.send(QueueMessage::new("hello")).await.unwrap();
        assert_eq!(broker.pending("announce", None), 1);

        let msg = receiver.receive().await.unwrap().unwrap();
        assert_eq!(msg.body, "hello");
        assert_eq!(broker.pending("announce", None), 0);
        assert_eq!(broker.sent_count("announce"), 1);
    }

    #[tokio::test]
    async fn test_session_partitioning() {
        let broker = MemoryBroker::new();
        let queue = open(&broker, "session");
        let sender = queue.create_sender().unwrap();
        let for_a = queue.create_receiver(Some("a")).unwrap();
        let for_b = queue.create_receiver(Some("b")).unwrap();

        sender
            .send(QueueMessage::new("to-b").with_session("b"))
            .await
            .unwrap();
        sender
            .send(QueueMessage::new("to-a").with_session("a"))
            .await
            .unwrap();

        assert_eq!(for_a.receive().await.unwrap().unwrap().body, "to-a");
        assert_eq!(for_b.receive().await.unwrap().unwrap().body, "to-b");
    }

    #[tokio::test]
    async fn test_receive_waits_for_delivery() {
        let broker = MemoryBroker::new();
        let queue = open(&broker, "q");
        let receiver = queue.create_receiver(None).unwrap();
        let sender = queue.create_sender().unwrap();

        let pending = tokio::spawn(async move { receiver.receive().await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        sender.send(QueueMessage::new("late")).await.unwrap();

        let msg = pending.await.unwrap().unwrap().unwrap();
        assert_eq!(msg.body, "late");
    }

    #[tokio::test]
    async fn test_close_wakes_pending_receive() {
        let broker = MemoryBroker::new();
        let queue = open(&broker, "q");
        let receiver = queue.create_receiver(None).unwrap();

        let waiting = Arc::clone(&receiver);
        let pending = tokio::spawn(async move { waiting.receive().await });
        tokio::time::sleep(Duration::from_millis(10)).await;

        receiver.close().await.unwrap();
        assert!(pending.await.unwrap().is_none());
        assert!(receiver.is_closed());

        // second close is a no-op
        receiver.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_connection_close_cascades() {
        let broker = MemoryBroker::new();
        let conn = broker.connection();
        let queue = conn.open_queue("q").unwrap();
        let sender = queue.create_sender().unwrap();
        assert_eq!(broker.open_connections(), 1);

        conn.close().await.unwrap();
        assert!(queue.is_closed());
        assert!(sender.is_closed());
        assert!(queue.create_sender().is_err());
        assert!(conn.open_queue("other").is_err());
        assert!(sender.send(QueueMessage::new("x")).await.is_err());
        assert_eq!(broker.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_closed_handles_are_pruned() {
        let broker = MemoryBroker::new();
        for _ in 0..50 {
            let conn = broker.connection();
            conn.close().await.unwrap();
        }
        let conn = broker.connection();
        assert_eq!(lock(&broker.inner.connections).len(), 1);

        for _ in 0..50 {
            let queue = conn.open_queue("q").unwrap();
            queue.close().await.unwrap();
        }
        let _live = conn.open_queue("q").unwrap();
        assert_eq!(lock(&conn.lifecycle.children).len(), 1);
        assert_eq!(broker.open_connections(), 1);
    }

    #[tokio::test]
    async fn test_fault_injection_is_one_shot() {
        let broker = MemoryBroker::new();
        let queue = open(&broker, "q");
        let sender = queue.create_sender().unwrap();
        let receiver = queue.create_receiver(None).unwrap();

        broker.fail_next_send("q");
        assert!(sender.send(QueueMessage::new("a")).await.is_err());
        assert!(sender.send(QueueMessage::new("b")).await.is_ok());

        broker.fail_next_receive("q");
        assert!(receiver.receive().await.unwrap().is_err());
        assert_eq!(receiver.receive().await.unwrap().unwrap().body, "b");
    }

    #[test]
    fn test_connector_rejects_foreign_scheme() {
        let broker = MemoryBroker::new();
        assert!(broker.connect("memory://ns").is_ok());
        assert!(broker.connect("Endpoint=sb://example/").is_err());
    }
}
