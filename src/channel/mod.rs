//! Channel adapters over the queue transport.
//!
//! Two thin wrappers own every transport handle a bus uses:
//!
//! | Adapter               | Queue       | Partitioned | Used for                      |
//! |-----------------------|-------------|-------------|-------------------------------|
//! | [`RendezvousChannel`] | root        | no          | one announcement per bus      |
//! | [`SessionChannel`]    | session     | yes         | all post-handshake traffic    |
//!
//! Adapters carry no protocol logic. They open handles lazily, hand out
//! shared references for the receive loops, and release each handle at
//! most once, swallowing close failures.

mod rendezvous;
mod session;

pub use rendezvous::RendezvousChannel;
pub use session::SessionChannel;

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;

/// Optional, lazily created transport handle.
pub(crate) struct HandleSlot<T: ?Sized> {
    handle: Mutex<Option<Arc<T>>>,
}

impl<T: ?Sized> HandleSlot<T> {
    pub(crate) fn empty() -> Self {
        Self {
            handle: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<T>>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current handle, creating it on first use
    pub(crate) fn get_or_try_init(&self, init: impl FnOnce() -> Result<Arc<T>>) -> Result<Arc<T>> {
        let mut slot = self.lock();
        if let Some(handle) = slot.as_ref() {
            return Ok(Arc::clone(handle));
        }
        let handle = init()?;
        *slot = Some(Arc::clone(&handle));
        Ok(handle)
    }

    pub(crate) fn take(&self) -> Option<Arc<T>> {
        self.lock().take()
    }

    pub(crate) fn is_set(&self) -> bool {
        self.lock().is_some()
    }
}

/// Close a handle unless it already is, logging instead of failing.
pub(crate) async fn release<F>(what: &str, already_closed: bool, close: F)
where
    F: Future<Output = Result<()>>,
{
    if already_closed {
        tracing::debug!("{} already closed", what);
        return;
    }
    match close.await {
        Ok(()) => tracing::debug!("{} closed", what),
        Err(e) => tracing::warn!("Failed to close {}: {}", what, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BusError;

    #[test]
    fn test_slot_initializes_once() {
        let slot: HandleSlot<String> = HandleSlot::empty();
        let mut calls = 0;

        let first = slot
            .get_or_try_init(|| {
                calls += 1;
                Ok(Arc::new("sender".to_string()))
            })
            .unwrap();
        let second = slot
            .get_or_try_init(|| {
                calls += 1;
                Ok(Arc::new("other".to_string()))
            })
            .unwrap();

        assert_eq!(calls, 1);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_slot_failed_init_stays_empty() {
        let slot: HandleSlot<String> = HandleSlot::empty();
        assert!(slot
            .get_or_try_init(|| Err(BusError::transport("closed")))
            .is_err());
        assert!(!slot.is_set());
        assert!(slot.take().is_none());
    }

    #[tokio::test]
    async fn test_release_swallows_errors() {
        release("root sender", false, std::future::ready(Err(BusError::transport("boom")))).await;
        release("root sender", true, std::future::ready(Ok(()))).await;
    }
}
