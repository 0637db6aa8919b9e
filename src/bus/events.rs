//! Asynchronous status notifications.
//!
//! A bus reports everything that happens on its own schedule through a
//! single ordered stream of [`BusEvent`]s. Emission is fire-and-forget:
//! if the [`BusEvents`] receiver was dropped, events are discarded.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::error::BusError;

/// Notification raised by a bus
#[derive(Debug)]
pub enum BusEvent {
    /// Negotiation complete, both session ids resolved
    Ready,
    /// Payload delivered on our session partition
    Message(String),
    /// Transport or decode failure during negotiation or receive
    Error(BusError),
}

impl BusEvent {
    /// True for [`BusEvent::Ready`]
    pub fn is_ready(&self) -> bool {
        matches!(self, BusEvent::Ready)
    }

    /// Payload of a [`BusEvent::Message`]
    pub fn message(&self) -> Option<&str> {
        match self {
            BusEvent::Message(body) => Some(body),
            _ => None,
        }
    }

    /// Cause of a [`BusEvent::Error`]
    pub fn error(&self) -> Option<&BusError> {
        match self {
            BusEvent::Error(err) => Some(err),
            _ => None,
        }
    }
}

/// Receive end of a bus's notifications.
///
/// Yields `None` once the bus is gone and every queued event was read.
#[derive(Debug)]
pub struct BusEvents {
    rx: mpsc::UnboundedReceiver<BusEvent>,
}

impl BusEvents {
    /// Wait for the next event
    pub async fn recv(&mut self) -> Option<BusEvent> {
        self.rx.recv().await
    }

    /// Next event if one is already queued
    pub fn try_recv(&mut self) -> Option<BusEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for BusEvents {
    type Item = BusEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Send end, owned privately by the negotiation core.
#[derive(Debug, Clone)]
pub(crate) struct EventDispatcher {
    tx: mpsc::UnboundedSender<BusEvent>,
}

impl EventDispatcher {
    pub(crate) fn channel() -> (Self, BusEvents) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, BusEvents { rx })
    }

    pub(crate) fn emit(&self, event: BusEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("event receiver dropped, discarding event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_events_in_order() {
        let (dispatcher, mut events) = EventDispatcher::channel();
        dispatcher.emit(BusEvent::Ready);
        dispatcher.emit(BusEvent::Message("one".to_string()));
        dispatcher.emit(BusEvent::Error(BusError::NotReady));

        assert!(events.recv().await.unwrap().is_ready());
        assert_eq!(events.next().await.unwrap().message(), Some("one"));
        assert!(matches!(
            events.try_recv().unwrap().error(),
            Some(BusError::NotReady)
        ));
        assert!(events.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_emit_after_receiver_dropped() {
        let (dispatcher, events) = EventDispatcher::channel();
        drop(events);
        dispatcher.emit(BusEvent::Ready);
    }

    #[tokio::test]
    async fn test_stream_ends_when_dispatcher_dropped() {
        let (dispatcher, mut events) = EventDispatcher::channel();
        dispatcher.emit(BusEvent::Message("last".to_string()));
        drop(dispatcher);

        assert_eq!(events.next().await.unwrap().message(), Some("last"));
        assert!(events.next().await.is_none());
    }
}
