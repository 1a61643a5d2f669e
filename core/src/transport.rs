//! Transport abstraction: the message broker boundary.
//!
//! The [`Transport`] trait is the only way envelopes enter or leave a
//! translator process. Inbound messages arrive as [`Delivery`] values on a
//! [`DeliveryStream`]; outbound envelopes are handed to
//! [`Transport::publish`].
//!
//! # Delivery Semantics
//!
//! - **At-least-once**: a delivery that is never acknowledged will be
//!   delivered again, possibly to another process
//! - **Ordered per stream**: deliveries sharing a `stream_id` arrive in order
//! - **Unordered across streams**: no relative ordering between streams
//!
//! # Implementations
//!
//! - `InMemoryTransport` (testing crate) - fast, deterministic, supports redelivery
//! - `RedpandaTransport` (redpanda crate) - Kafka-compatible, manual offset commits

use crate::envelope::Envelope;
use futures::Stream;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur at the transport boundary.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// Failed to connect to the broker
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Failed to hand an envelope to the broker
    #[error("Publish failed for '{name}': {reason}")]
    PublishFailed {
        /// Name of the envelope that failed
        name: String,
        /// The reason for failure
        reason: String,
    },

    /// Failed to subscribe to topics
    #[error("Subscription failed for topics {topics:?}: {reason}")]
    SubscriptionFailed {
        /// The topics that failed to subscribe
        topics: Vec<String>,
        /// The reason for failure
        reason: String,
    },

    /// A received record was not a valid envelope
    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Failed to acknowledge a delivery
    #[error("Acknowledge failed: {0}")]
    AcknowledgeFailed(String),

    /// Generic error for other failures
    #[error("Transport error: {0}")]
    Other(String),
}

/// Acknowledgement handle for one delivery.
///
/// Acknowledging tells the transport the message has been fully processed
/// (handled, ignored, or dead-lettered) and must not be redelivered.
pub trait Acknowledge: Send + Sync {
    /// Acknowledge the delivery.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::AcknowledgeFailed`] if the broker rejected
    /// the acknowledgement; the message may then be redelivered.
    fn ack(&self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>>;
}

/// Acknowledgement for transports that have nothing to commit.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoAck;

impl Acknowledge for NoAck {
    fn ack(&self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async { Ok(()) })
    }
}

/// An inbound envelope together with its acknowledgement handle.
#[derive(Clone)]
pub struct Delivery {
    envelope: Envelope,
    attempt: u32,
    acker: Arc<dyn Acknowledge>,
}

impl Delivery {
    /// Wrap an envelope delivered for the first time.
    #[must_use]
    pub fn new(envelope: Envelope, acker: Arc<dyn Acknowledge>) -> Self {
        Self {
            envelope,
            attempt: 1,
            acker,
        }
    }

    /// Wrap an envelope with no acknowledgement semantics.
    #[must_use]
    pub fn unacknowledged(envelope: Envelope) -> Self {
        Self::new(envelope, Arc::new(NoAck))
    }

    /// Mark this as the `attempt`-th delivery of the same envelope.
    #[must_use]
    pub const fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = attempt;
        self
    }

    /// The delivered envelope.
    #[must_use]
    pub const fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// How many times the transport has delivered this envelope (1-based).
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Acknowledge the delivery.
    ///
    /// # Errors
    ///
    /// Propagates the transport's acknowledgement failure.
    pub async fn ack(&self) -> Result<(), TransportError> {
        self.acker.ack().await
    }
}

impl fmt::Debug for Delivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("envelope", &self.envelope)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// Stream of deliveries from a subscription.
pub type DeliveryStream = Pin<Box<dyn Stream<Item = Result<Delivery, TransportError>> + Send>>;

/// Trait for message broker implementations.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`: one transport is shared by the
/// consumer loop and every concurrent publish.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the runtime can hold
/// `Arc<dyn Transport>`.
pub trait Transport: Send + Sync {
    /// Hand a fully-built envelope to the broker.
    ///
    /// Completes once the broker has accepted the envelope; a Handler must
    /// not report success before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::PublishFailed`] if the broker refused it.
    fn publish(
        &self,
        envelope: &Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>>;

    /// Subscribe to one or more topics.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::SubscriptionFailed`] if the subscription
    /// could not be established.
    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, TransportError>> + Send + '_>>;
}

/// Topic an envelope is routed to: its name without the final segment.
///
/// `"progression.event.hearing-resulted"` is published on
/// `"progression.event"`; a name without dots is its own topic.
#[must_use]
pub fn topic_for(name: &str) -> &str {
    name.rsplit_once('.').map_or(name, |(topic, _)| topic)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn topic_strips_last_segment() {
        assert_eq!(topic_for("progression.event.hearing-resulted"), "progression.event");
        assert_eq!(topic_for("public.X-changed"), "public");
        assert_eq!(topic_for("X-changed"), "X-changed");
    }

    proptest::proptest! {
        #[test]
        fn topic_drops_at_most_one_segment(name in "[a-z]{1,8}(\\.[a-z-]{1,8}){0,4}") {
            let topic = topic_for(&name);
            proptest::prop_assert!(name.starts_with(topic));
            let rest = &name[topic.len()..];
            proptest::prop_assert!(rest.is_empty() || (rest.starts_with('.') && !rest[1..].contains('.')));
        }
    }

    #[tokio::test]
    async fn unacknowledged_delivery_acks_trivially() {
        let envelope = Envelope::builder().id("m1").name("x").build().unwrap();
        let delivery = Delivery::unacknowledged(envelope).with_attempt(3);
        assert_eq!(delivery.attempt(), 3);
        assert!(delivery.ack().await.is_ok());
    }
}
