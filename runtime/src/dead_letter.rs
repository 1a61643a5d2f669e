//! Dead-letter queue for envelopes that could not be dispatched.
//!
//! Entries land here when a dispatch fails with a non-retryable error or
//! exhausts its redelivery attempts. The queue is bounded; when full, the
//! oldest entry is dropped.
//!
//! # Example
//!
//! ```rust
//! use event_translator_runtime::dead_letter::DeadLetterQueue;
//!
//! let dlq: DeadLetterQueue<String> = DeadLetterQueue::new(2);
//! dlq.push("a".to_string(), "enrichment timed out".to_string(), 5);
//! dlq.push("b".to_string(), "missing caseId".to_string(), 1);
//! dlq.push("c".to_string(), "missing caseId".to_string(), 1);
//!
//! let drained: Vec<_> = dlq.drain().into_iter().map(|e| e.payload).collect();
//! assert_eq!(drained, vec!["b".to_string(), "c".to_string()]);
//! ```

use chrono::{DateTime, Utc};
use event_translator_core::envelope::Envelope;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

/// Default capacity of a [`DeadLetterQueue`].
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 1000;

/// Dead-letter entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter<T = Envelope> {
    /// The payload that failed (usually the inbound envelope)
    pub payload: T,

    /// Rendered error of the last failure
    pub error_message: String,

    /// Deliveries attempted before giving up
    pub attempts: u32,

    /// When the entry was parked
    pub dead_lettered_at: DateTime<Utc>,
}

/// Bounded, shareable dead-letter queue.
///
/// Clones share the same storage.
#[derive(Debug)]
pub struct DeadLetterQueue<T = Envelope> {
    queue: Arc<Mutex<VecDeque<DeadLetter<T>>>>,
    max_size: usize,
}

impl<T> DeadLetterQueue<T> {
    /// Empty queue holding at most `max_size` entries (at least one).
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        Self {
            queue: Arc::new(Mutex::new(VecDeque::new())),
            max_size: max_size.max(1),
        }
    }

    /// Park a failed payload. Drops the oldest entry when full.
    pub fn push(&self, payload: T, error_message: String, attempts: u32) {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);

        if queue.len() >= self.max_size {
            queue.pop_front();
            metrics::counter!("translator_dead_letters_dropped_total").increment(1);
            tracing::warn!(max_size = self.max_size, "Dead-letter queue at capacity, dropping oldest entry");
        }

        queue.push_back(DeadLetter {
            payload,
            error_message,
            attempts,
            dead_lettered_at: Utc::now(),
        });

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!("translator_dead_letter_queue_size").set(queue.len() as f64);
        metrics::counter!("translator_dead_letters_total").increment(1);
    }

    /// Current number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every entry, oldest first.
    pub fn drain(&self) -> Vec<DeadLetter<T>> {
        let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        let entries: Vec<_> = queue.drain(..).collect();
        metrics::gauge!("translator_dead_letter_queue_size").set(0.0);
        tracing::info!(count = entries.len(), "Drained dead-letter queue");
        entries
    }

    /// Oldest entry, if any.
    #[must_use]
    pub fn peek(&self) -> Option<DeadLetter<T>>
    where
        T: Clone,
    {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .front()
            .cloned()
    }

    /// Capacity.
    #[must_use]
    pub const fn max_size(&self) -> usize {
        self.max_size
    }
}

impl<T> Clone for DeadLetterQueue<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Arc::clone(&self.queue),
            max_size: self.max_size,
        }
    }
}

impl<T> Default for DeadLetterQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_DEAD_LETTER_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_share_storage() {
        let dlq: DeadLetterQueue<u32> = DeadLetterQueue::new(10);
        let other = dlq.clone();
        other.push(7, "boom".to_string(), 3);

        let entry = dlq.peek();
        assert_eq!(entry.as_ref().map(|e| e.payload), Some(7));
        assert_eq!(entry.map(|e| e.attempts), Some(3));
        assert_eq!(dlq.len(), 1);
    }

    #[test]
    fn zero_capacity_still_keeps_latest() {
        let dlq: DeadLetterQueue<u32> = DeadLetterQueue::new(0);
        dlq.push(1, "a".to_string(), 1);
        dlq.push(2, "b".to_string(), 1);

        assert_eq!(dlq.max_size(), 1);
        assert_eq!(dlq.drain().into_iter().map(|e| e.payload).collect::<Vec<_>>(), vec![2]);
        assert!(dlq.is_empty());
    }
}
