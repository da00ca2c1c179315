//! Execution and failure listeners attached to a request.
//!
//! # Design
//! Listeners are registered under a `ListenerId` token and removed by that
//! token. Notification copies the current listener list while holding the
//! lock, releases it, and then calls each listener, so a listener may
//! remove itself (or register others) from inside its callback.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use crate::error::RequestError;
use crate::request::Request;
use crate::response::Response;

/// Receives the outcome of executing a request.
pub trait RequestListener: Send + Sync {
    /// Called once the response is complete: the sink has finished and the
    /// transport response has been released.
    fn request_executed(&self, _request: &Request, _response: &Response) {}

    /// Called before the error is returned to the caller.
    fn request_failed(&self, _request: &Request, _error: &RequestError) {}
}

/// Token identifying one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    #[cfg(test)]
    pub(crate) fn for_tests(raw: u64) -> Self {
        ListenerId(raw)
    }
}

type Entry = (ListenerId, Arc<dyn RequestListener>);

#[derive(Default)]
pub struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl Listeners {
    pub fn add(&self, listener: Arc<dyn RequestListener>) -> ListenerId {
        self.add_with(|_| listener)
    }

    /// Register a listener that needs to know its own id, typically so it
    /// can remove itself when notified.
    pub fn add_with<F>(&self, make: F) -> ListenerId
    where
        F: FnOnce(ListenerId) -> Arc<dyn RequestListener>,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let listener = make(id);
        self.entries.lock().push((id, listener));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.entries.lock().iter().any(|(entry_id, _)| *entry_id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn RequestListener>> {
        self.entries.lock().iter().map(|(_, l)| Arc::clone(l)).collect()
    }

    pub(crate) fn notify_executed(&self, request: &Request, response: &Response) {
        let listeners = self.snapshot();
        trace!(count = listeners.len(), status = response.status(), "notifying execution listeners");
        for listener in listeners {
            listener.request_executed(request, response);
        }
    }

    pub(crate) fn notify_failed(&self, request: &Request, error: &RequestError) {
        let listeners = self.snapshot();
        trace!(count = listeners.len(), %error, "notifying failure listeners");
        for listener in listeners {
            listener.request_failed(request, error);
        }
    }
}

impl fmt::Debug for Listeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listeners").field("count", &self.len()).finish()
    }
}
