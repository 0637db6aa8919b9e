//! Rendezvous channel: the shared, unpartitioned announcement queue.

use std::sync::Arc;

use super::{release, HandleSlot};
use crate::error::Result;
use crate::protocol::Announcement;
use crate::transport::{QueueClient, QueueConnection, QueueMessage, QueueReceiver, QueueSender};

/// Adapter over the root queue.
pub struct RendezvousChannel {
    queue: Arc<dyn QueueClient>,
    sender: HandleSlot<dyn QueueSender>,
    receiver: HandleSlot<dyn QueueReceiver>,
}

impl RendezvousChannel {
    /// Open the named root queue
    pub fn open(connection: &dyn QueueConnection, name: &str) -> Result<Self> {
        Ok(Self {
            queue: connection.open_queue(name)?,
            sender: HandleSlot::empty(),
            receiver: HandleSlot::empty(),
        })
    }

    /// Queue name
    pub fn name(&self) -> &str {
        self.queue.name()
    }

    /// Publish one announcement; resolves on transport acknowledgement
    pub async fn announce(&self, announcement: &Announcement) -> Result<()> {
        let body = announcement.to_json()?;
        let sender = self.sender.get_or_try_init(|| self.queue.create_sender())?;
        sender.send(QueueMessage::new(body)).await
    }

    /// Start listening for unpartitioned announcements
    pub fn listen(&self) -> Result<Arc<dyn QueueReceiver>> {
        self.receiver
            .get_or_try_init(|| self.queue.create_receiver(None))
    }

    /// Drop the send handle once the announcement is out
    pub async fn release_sender(&self) {
        if let Some(sender) = self.sender.take() {
            release("rendezvous sender", sender.is_closed(), sender.close()).await;
        }
    }

    /// Drop the receive handle after the single announcement was consumed
    pub async fn release_receiver(&self) {
        if let Some(receiver) = self.receiver.take() {
            release("rendezvous receiver", receiver.is_closed(), receiver.close()).await;
        }
    }

    /// Whether a send handle is currently held
    pub fn has_sender(&self) -> bool {
        self.sender.is_set()
    }

    /// Whether a receive handle is currently held
    pub fn has_receiver(&self) -> bool {
        self.receiver.is_set()
    }

    /// Release both handles and the queue. Idempotent.
    pub async fn close(&self) {
        self.release_sender().await;
        self.release_receiver().await;
        release("rendezvous queue", self.queue.is_closed(), self.queue.close()).await;
    }

    /// Whether the queue handle is closed
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SessionIdentity;
    use crate::transport::MemoryBroker;

    #[tokio::test]
    async fn test_announce_and_listen() {
        let broker = MemoryBroker::new();
        let conn = broker.connection();
        let announcer = RendezvousChannel::open(&conn, "announce").unwrap();
        let listener = RendezvousChannel::open(&conn, "announce").unwrap();

        let announcement = Announcement::from_identity(&SessionIdentity::generate());
        let receiver = listener.listen().unwrap();
        announcer.announce(&announcement).await.unwrap();
        assert!(announcer.has_sender());

        let msg = receiver.receive().await.unwrap().unwrap();
        assert_eq!(Announcement::from_json(&msg.body).unwrap(), announcement);
        assert!(msg.session_id.is_none());
    }

    #[tokio::test]
    async fn test_release_is_idempotent() {
        let broker = MemoryBroker::new();
        let conn = broker.connection();
        let channel = RendezvousChannel::open(&conn, "announce").unwrap();

        let receiver = channel.listen().unwrap();
        channel.release_receiver().await;
        assert!(receiver.is_closed());
        assert!(!channel.has_receiver());

        channel.release_receiver().await;
        channel.close().await;
        channel.close().await;
        assert!(channel.is_closed());
    }
}
