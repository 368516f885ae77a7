use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Serialises turns per session id so a load, model call and store run as one unit.
#[derive(Default)]
pub(crate) struct SessionLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLocks {
    pub(crate) async fn acquire(&self, session_id: &str) -> SessionGuard<'_> {
        let lock = self
            .inner
            .lock()
            .entry(session_id.to_string())
            .or_default()
            .clone();
        let guard = lock.lock_owned().await;

        SessionGuard {
            locks: self,
            session_id: session_id.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.inner.lock().len()
    }

    fn release(&self, session_id: &str) {
        let mut inner = self.inner.lock();
        // Only the map still points at the lock once nobody holds or waits on it.
        if inner
            .get(session_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            inner.remove(session_id);
        }
    }
}

pub(crate) struct SessionGuard<'a> {
    locks: &'a SessionLocks,
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks.release(&self.session_id);
    }
}
