use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::context::AbortHandle;

/// Abort handles of the requests currently inside the dispatcher
///
/// Shared between [`AppService`](super::AppService) clones and the
/// [`ServerHandle`](super::ServerHandle); stopping the server aborts every
/// tracked request so no response is written for work cut short.
#[derive(Clone, Debug, Default)]
pub struct InFlight {
    next_id: Arc<AtomicU64>,
    handles: Arc<DashMap<u64, AbortHandle>>,
}

impl InFlight {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh abort handle; it is forgotten when the guard drops
    #[must_use]
    pub fn track(&self) -> InFlightGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let abort = AbortHandle::new();
        self.handles.insert(id, abort.clone());
        InFlightGuard {
            id,
            abort,
            handles: Arc::clone(&self.handles),
        }
    }

    /// Abort every tracked request, returning how many were signalled
    pub fn abort_all(&self) -> usize {
        let mut count = 0;
        for entry in self.handles.iter() {
            entry.value().abort();
            count += 1;
        }
        count
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

/// One tracked request
pub struct InFlightGuard {
    id: u64,
    abort: AbortHandle,
    handles: Arc<DashMap<u64, AbortHandle>>,
}

impl InFlightGuard {
    /// Handle to pass to [`Dispatcher::handle`](crate::dispatcher::Dispatcher::handle)
    #[must_use]
    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.handles.remove(&self.id);
    }
}
