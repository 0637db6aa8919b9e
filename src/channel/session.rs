//! Session channel: the partitioned data queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::{release, HandleSlot};
use crate::error::{BusError, Result};
use crate::transport::{QueueClient, QueueConnection, QueueMessage, QueueReceiver, QueueSender};

/// Adapter over the session queue.
pub struct SessionChannel {
    queue: Arc<dyn QueueClient>,
    sender: HandleSlot<dyn QueueSender>,
    receiver: HandleSlot<dyn QueueReceiver>,
    closed: AtomicBool,
}

impl SessionChannel {
    /// Open the named session queue
    pub fn open(connection: &dyn QueueConnection, name: &str) -> Result<Self> {
        Ok(Self {
            queue: connection.open_queue(name)?,
            sender: HandleSlot::empty(),
            receiver: HandleSlot::empty(),
            closed: AtomicBool::new(false),
        })
    }

    /// Queue name
    pub fn name(&self) -> &str {
        self.queue.name()
    }

    /// Start listening on our own partition
    pub fn listen(&self, local_session_id: &str) -> Result<Arc<dyn QueueReceiver>> {
        self.ensure_open()?;
        self.receiver
            .get_or_try_init(|| self.queue.create_receiver(Some(local_session_id)))
    }

    /// Send `body` to the peer's partition, tagged with our own as reply-to.
    ///
    /// The send handle is created on first use and reused afterwards.
    pub async fn send(&self, body: String, to: &str, reply_to: &str) -> Result<()> {
        self.ensure_open()?;
        let sender = self.sender.get_or_try_init(|| self.queue.create_sender())?;
        sender
            .send(QueueMessage::new(body).with_session(to).with_reply_to(reply_to))
            .await
    }

    /// Whether a send handle has been created
    pub fn has_sender(&self) -> bool {
        self.sender.is_set()
    }

    /// Whether a receive handle is currently held
    pub fn has_receiver(&self) -> bool {
        self.receiver.is_set()
    }

    /// Release both handles and the queue. Idempotent.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Some(sender) = self.sender.take() {
            release("session sender", sender.is_closed(), sender.close()).await;
        }
        if let Some(receiver) = self.receiver.take() {
            release("session receiver", receiver.is_closed(), receiver.close()).await;
        }
        release("session queue", self.queue.is_closed(), self.queue.close()).await;
    }

    /// Whether [`SessionChannel::close`] ran or the queue closed underneath us
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.queue.is_closed()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BusError::transport(format!(
                "session queue '{}' is closed",
                self.name()
            )));
        }
        Ok(())
    }
}
