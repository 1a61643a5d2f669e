//! Bounded memory of processed inbound message ids.
//!
//! Outbound ids are deterministic, so a redelivered message republishes the
//! same envelopes even without this cache. The cache saves the enrichment
//! calls and publishes for duplicates the consumer has already seen.

use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Default number of remembered ids.
pub const DEFAULT_PROCESSED_CAPACITY: usize = 10_000;

/// FIFO-bounded set of message ids that were dispatched successfully.
#[derive(Debug)]
pub struct ProcessedMessages {
    inner: Mutex<Window>,
    capacity: usize,
}

#[derive(Debug, Default)]
struct Window {
    ids: HashSet<String>,
    order: VecDeque<String>,
}

impl ProcessedMessages {
    /// Remember at most `capacity` ids (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Window::default()),
            capacity: capacity.max(1),
        }
    }

    /// Whether `id` was recorded and not yet evicted.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .contains(id)
    }

    /// Record `id`. Returns `false` if it was already present.
    pub fn insert(&self, id: &str) -> bool {
        let mut window = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if window.ids.contains(id) {
            return false;
        }
        if window.order.len() >= self.capacity {
            if let Some(oldest) = window.order.pop_front() {
                window.ids.remove(&oldest);
            }
        }
        window.ids.insert(id.to_string());
        window.order.push_back(id.to_string());
        true
    }

    /// Number of remembered ids.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner).order.len()
    }

    /// Whether nothing is remembered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ProcessedMessages {
    fn default() -> Self {
        Self::new(DEFAULT_PROCESSED_CAPACITY)
    }
}
