//! In-memory transport for fast, deterministic tests.
//!
//! Envelopes handed to [`InMemoryTransport::deliver`] are routed to
//! subscribers by topic (`topic_for(name)`). Envelopes published through the
//! [`Transport`] trait are recorded, not delivered. Deliveries that arrive before a matching
//! subscription are buffered and flushed when one appears. Every delivery
//! carries an acknowledgement handle; unacknowledged deliveries can be
//! redelivered with [`InMemoryTransport::redeliver_unacked`].

use event_translator_core::envelope::Envelope;
use event_translator_core::transport::{
    Acknowledge, Delivery, DeliveryStream, Transport, TransportError, topic_for,
};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

/// In-memory broker.
///
/// Clones share the same broker state.
#[derive(Clone, Default)]
pub struct InMemoryTransport {
    state: Arc<Mutex<BrokerState>>,
}

#[derive(Default)]
struct BrokerState {
    published: Vec<Envelope>,
    subscribers: Vec<Subscriber>,
    pending: Vec<Delivery>,
    in_flight: BTreeMap<u64, (Envelope, u32)>,
    acked: Vec<String>,
    next_token: u64,
    failing_publishes: usize,
}

struct Subscriber {
    topics: Vec<String>,
    tx: mpsc::UnboundedSender<Delivery>,
}

impl Subscriber {
    fn accepts(&self, envelope: &Envelope) -> bool {
        let topic = topic_for(envelope.name());
        self.topics.iter().any(|t| t == topic)
    }
}

struct InMemoryAck {
    token: u64,
    state: Arc<Mutex<BrokerState>>,
}

impl Acknowledge for InMemoryAck {
    fn ack(&self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async move {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some((envelope, _)) = state.in_flight.remove(&self.token) {
                state.acked.push(envelope.id().to_string());
            }
            Ok(())
        })
    }
}

impl InMemoryTransport {
    /// Create an empty broker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver an inbound envelope to subscribers of its topic.
    pub fn deliver(&self, envelope: Envelope) {
        self.route(envelope, 1);
    }

    fn route(&self, envelope: Envelope, attempt: u32) {
        let mut state = self.lock();
        let token = state.next_token;
        state.next_token += 1;
        state.in_flight.insert(token, (envelope.clone(), attempt));

        let acker = Arc::new(InMemoryAck {
            token,
            state: Arc::clone(&self.state),
        });
        let delivery = Delivery::new(envelope, acker).with_attempt(attempt);
        Self::dispatch(&mut state, delivery);
    }

    fn dispatch(state: &mut BrokerState, mut delivery: Delivery) {
        // Drop subscribers whose stream has gone away, keep trying the rest.
        while let Some(position) = state
            .subscribers
            .iter()
            .position(|s| s.accepts(delivery.envelope()))
        {
            match state.subscribers[position].tx.send(delivery) {
                Ok(()) => return,
                Err(mpsc::error::SendError(returned)) => {
                    state.subscribers.remove(position);
                    delivery = returned;
                }
            }
        }
        state.pending.push(delivery);
    }

    /// Make the next `n` publishes fail with [`TransportError::PublishFailed`].
    pub fn fail_next_publishes(&self, n: usize) {
        self.lock().failing_publishes = n;
    }

    /// Every envelope published so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<Envelope> {
        self.lock().published.clone()
    }

    /// Names of every envelope published so far, in publish order.
    #[must_use]
    pub fn published_names(&self) -> Vec<String> {
        self.lock()
            .published
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    /// Ids of acknowledged deliveries, in acknowledgement order.
    #[must_use]
    pub fn acked_ids(&self) -> Vec<String> {
        self.lock().acked.clone()
    }

    /// Number of deliveries not yet acknowledged.
    #[must_use]
    pub fn unacked_count(&self) -> usize {
        self.lock().in_flight.len()
    }

    /// Redeliver every unacknowledged envelope with its attempt incremented.
    ///
    /// Returns the number of redeliveries.
    pub fn redeliver_unacked(&self) -> usize {
        let outstanding: Vec<(Envelope, u32)> = {
            let mut state = self.lock();
            std::mem::take(&mut state.in_flight).into_values().collect()
        };
        let count = outstanding.len();
        for (envelope, attempt) in outstanding {
            self.route(envelope, attempt + 1);
        }
        count
    }

    /// End every open subscription stream.
    pub fn close(&self) {
        self.lock().subscribers.clear();
    }
}

impl Transport for InMemoryTransport {
    fn publish(
        &self,
        envelope: &Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        let envelope = envelope.clone();
        Box::pin(async move {
            let mut state = self.lock();
            if state.failing_publishes > 0 {
                state.failing_publishes -= 1;
                return Err(TransportError::PublishFailed {
                    name: envelope.name().to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            state.published.push(envelope);
            Ok(())
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, TransportError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|t| (*t).to_string()).collect();
        Box::pin(async move {
            let (tx, mut rx) = mpsc::unbounded_channel();
            let subscriber = Subscriber { topics, tx };

            {
                let mut state = self.lock();
                let (matching, rest): (Vec<Delivery>, Vec<Delivery>) = std::mem::take(&mut state.pending)
                    .into_iter()
                    .partition(|d| subscriber.accepts(d.envelope()));
                state.pending = rest;
                for delivery in matching {
                    // The receiver is alive in this scope.
                    let _ = subscriber.tx.send(delivery);
                }
                state.subscribers.push(subscriber);
            }

            let stream = async_stream::stream! {
                while let Some(delivery) = rx.recv().await {
                    yield Ok::<_, TransportError>(delivery);
                }
            };
            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("InMemoryTransport")
            .field("published", &state.published.len())
            .field("subscribers", &state.subscribers.len())
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight.len())
            .finish()
    }
}
