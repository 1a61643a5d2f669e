//! Transport consumer feeding the dispatcher.
//!
//! `TranslatorConsumer` subscribes to the transport, routes every delivery to
//! an ordering lane and acknowledges it once it has been handled, ignored or
//! dead-lettered.
//!
//! # Ordering
//!
//! Deliveries are partitioned into lanes by `stream_id` (falling back to the
//! message id). Each lane processes one delivery at a time, so messages of
//! the same stream are dispatched strictly in arrival order while different
//! streams proceed concurrently.
//!
//! # Failure handling
//!
//! ```text
//! dispatch
//!   Ok                     -> remember id, ack
//!   Err (retryable)        -> back off, dispatch again (same lane, blocks the stream)
//!   Err (attempts spent)   -> dead-letter, ack
//!   Err (not retryable)    -> dead-letter, ack
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let consumer = TranslatorConsumer::builder()
//!     .name("progression-translators")
//!     .transport(transport)
//!     .dispatcher(Arc::new(dispatcher))
//!     .lanes(8)
//!     .redelivery(RedeliveryPolicy::default())
//!     .shutdown(shutdown_rx)
//!     .build()?;
//!
//! let handle = consumer.spawn();
//! ```

use crate::dead_letter::DeadLetterQueue;
use crate::error::ConfigurationError;
use crate::idempotency::ProcessedMessages;
use crate::redelivery::RedeliveryPolicy;
use crate::registry::Dispatcher;
use event_translator_core::envelope::Envelope;
use event_translator_core::transport::{Delivery, DeliveryStream, Transport};
use futures::StreamExt;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Default number of ordering lanes.
pub const DEFAULT_LANES: usize = 8;

/// Deliveries buffered per lane before the consumer waits.
const LANE_CAPACITY: usize = 64;

/// Lane index for an ordering key.
#[must_use]
pub fn lane_for(key: &str, lanes: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let lanes = lanes.max(1) as u64;
    #[allow(clippy::cast_possible_truncation)]
    let lane = (hasher.finish() % lanes) as usize;
    lane
}

/// Ordering key of an envelope: its stream, or its own id if unordered.
#[must_use]
pub fn ordering_key(envelope: &Envelope) -> &str {
    envelope.stream_id().unwrap_or_else(|| envelope.id())
}

/// Subscribes to a transport and dispatches deliveries.
pub struct TranslatorConsumer {
    name: String,
    topics: Vec<String>,
    transport: Arc<dyn Transport>,
    shutdown: broadcast::Receiver<()>,
    retry_delay: Duration,
    lanes: usize,
    lane: Arc<Lane>,
}

/// State shared by every lane worker.
struct Lane {
    consumer: String,
    dispatcher: Arc<Dispatcher>,
    redelivery: RedeliveryPolicy,
    dead_letters: DeadLetterQueue,
    processed: Option<Arc<ProcessedMessages>>,
}

impl TranslatorConsumer {
    /// Create a builder for configuring a consumer.
    #[must_use]
    pub fn builder() -> TranslatorConsumerBuilder {
        TranslatorConsumerBuilder::default()
    }

    /// Topics this consumer subscribes to.
    #[must_use]
    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    /// Dead-letter queue receiving failed deliveries.
    #[must_use]
    pub fn dead_letters(&self) -> DeadLetterQueue {
        self.lane.dead_letters.clone()
    }

    /// Spawn the consumer as a background task.
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run the subscribe-process-reconnect loop until shutdown.
    ///
    /// On shutdown the lanes finish the deliveries they already hold before
    /// this returns; deliveries still in the transport stay unacknowledged.
    pub async fn run(mut self) {
        info!(consumer = %self.name, lanes = self.lanes, "Translator consumer started");

        let mut senders = Vec::with_capacity(self.lanes);
        let mut workers = Vec::with_capacity(self.lanes);
        for index in 0..self.lanes {
            let (tx, rx) = mpsc::channel(LANE_CAPACITY);
            senders.push(tx);
            workers.push(tokio::spawn(Arc::clone(&self.lane).work(index, rx)));
        }

        loop {
            let topics: Vec<&str> = self.topics.iter().map(String::as_str).collect();

            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Translator consumer received shutdown signal");
                    break;
                }
                subscribe_result = self.transport.subscribe(&topics) => {
                    match subscribe_result {
                        Ok(mut stream) => {
                            info!(consumer = %self.name, topics = ?self.topics, "Subscribed to transport");

                            if self.process_stream(&mut stream, &senders).await {
                                break;
                            }

                            warn!(consumer = %self.name, "Delivery stream ended, reconnecting in {:?}", self.retry_delay);
                            tokio::time::sleep(self.retry_delay).await;
                        }
                        Err(e) => {
                            error!(
                                consumer = %self.name,
                                error = %e,
                                "Failed to subscribe to transport, retrying in {:?}",
                                self.retry_delay
                            );
                            tokio::time::sleep(self.retry_delay).await;
                        }
                    }
                }
            }
        }

        drop(senders);
        for worker in workers {
            if let Err(e) = worker.await {
                error!(consumer = %self.name, error = %e, "Lane worker failed");
            }
        }

        info!(consumer = %self.name, "Translator consumer stopped");
    }

    /// Route deliveries to lanes until the stream ends or shutdown is signalled.
    ///
    /// Returns `true` on shutdown.
    async fn process_stream(
        &mut self,
        stream: &mut DeliveryStream,
        senders: &[mpsc::Sender<Delivery>],
    ) -> bool {
        loop {
            tokio::select! {
                _ = self.shutdown.recv() => {
                    info!(consumer = %self.name, "Translator consumer received shutdown signal during processing");
                    return true;
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(delivery)) => {
                            let lane = lane_for(ordering_key(delivery.envelope()), senders.len());
                            if senders[lane].send(delivery).await.is_err() {
                                error!(consumer = %self.name, lane, "Lane worker is gone, dropping delivery");
                            }
                        }
                        Some(Err(e)) => {
                            error!(consumer = %self.name, error = %e, "Error receiving delivery from stream");
                        }
                        None => return false,
                    }
                }
            }
        }
    }
}

impl Lane {
    async fn work(self: Arc<Self>, index: usize, mut rx: mpsc::Receiver<Delivery>) {
        while let Some(delivery) = rx.recv().await {
            self.process(&delivery).await;
            if let Err(e) = delivery.ack().await {
                warn!(
                    consumer = %self.consumer,
                    lane = index,
                    message_id = %delivery.envelope().id(),
                    error = %e,
                    "Failed to acknowledge delivery"
                );
            }
        }
    }

    /// Dispatch one delivery to completion: handled, ignored or dead-lettered.
    async fn process(&self, delivery: &Delivery) {
        let envelope = delivery.envelope();

        if let Some(processed) = &self.processed {
            if processed.contains(envelope.id()) {
                tracing::debug!(message_id = %envelope.id(), "Skipping already processed message");
                metrics::counter!("translator_duplicates_skipped_total").increment(1);
                return;
            }
        }

        let mut attempt = delivery.attempt().max(1);
        loop {
            match self.dispatcher.dispatch(envelope).await {
                Ok(_) => {
                    if let Some(processed) = &self.processed {
                        processed.insert(envelope.id());
                    }
                    return;
                }
                Err(e) if e.is_retryable() && self.redelivery.should_retry(attempt) => {
                    let delay = self.redelivery.delay_after(attempt);
                    warn!(
                        consumer = %self.consumer,
                        message_id = %envelope.id(),
                        name = %envelope.name(),
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Dispatch failed, retrying"
                    );
                    metrics::counter!("translator_redeliveries_total").increment(1);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        consumer = %self.consumer,
                        message_id = %envelope.id(),
                        name = %envelope.name(),
                        correlation_id = %envelope.correlation_id(),
                        attempt,
                        retryable = e.is_retryable(),
                        error = %e,
                        "Dispatch failed, dead-lettering message"
                    );
                    self.dead_letters.push(envelope.clone(), e.to_string(), attempt);
                    return;
                }
            }
        }
    }
}

/// Builder for configuring a [`TranslatorConsumer`].
#[derive(Default)]
pub struct TranslatorConsumerBuilder {
    name: Option<String>,
    topics: Vec<String>,
    transport: Option<Arc<dyn Transport>>,
    dispatcher: Option<Arc<Dispatcher>>,
    shutdown: Option<broadcast::Receiver<()>>,
    retry_delay: Option<Duration>,
    lanes: Option<usize>,
    redelivery: Option<RedeliveryPolicy>,
    dead_letters: Option<DeadLetterQueue>,
    processed: Option<Arc<ProcessedMessages>>,
}

impl TranslatorConsumerBuilder {
    /// Set consumer name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set topics to subscribe to (default: derived from the registered names).
    #[must_use]
    pub fn topics(mut self, topics: Vec<String>) -> Self {
        self.topics = topics;
        self
    }

    /// Set the transport.
    #[must_use]
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the dispatcher.
    #[must_use]
    pub fn dispatcher(mut self, dispatcher: Arc<Dispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Set shutdown signal receiver.
    #[must_use]
    pub fn shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Set delay before resubscribing (default: 5 seconds).
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = Some(delay);
        self
    }

    /// Set number of ordering lanes (default: 8).
    #[must_use]
    pub const fn lanes(mut self, lanes: usize) -> Self {
        self.lanes = Some(lanes);
        self
    }

    /// Set redelivery policy.
    #[must_use]
    pub fn redelivery(mut self, policy: RedeliveryPolicy) -> Self {
        self.redelivery = Some(policy);
        self
    }

    /// Set dead-letter queue (default: a fresh queue).
    #[must_use]
    pub fn dead_letters(mut self, dead_letters: DeadLetterQueue) -> Self {
        self.dead_letters = Some(dead_letters);
        self
    }

    /// Skip deliveries whose id was already processed.
    #[must_use]
    pub fn processed(mut self, processed: Arc<ProcessedMessages>) -> Self {
        self.processed = Some(processed);
        self
    }

    /// Build the [`TranslatorConsumer`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingSetting`] if the transport,
    /// dispatcher or shutdown receiver is missing, and
    /// [`ConfigurationError::InvalidSetting`] if there is nothing to
    /// subscribe to.
    pub fn build(self) -> Result<TranslatorConsumer, ConfigurationError> {
        let transport = self.transport.ok_or(ConfigurationError::MissingSetting("transport"))?;
        let dispatcher = self.dispatcher.ok_or(ConfigurationError::MissingSetting("dispatcher"))?;
        let shutdown = self.shutdown.ok_or(ConfigurationError::MissingSetting("shutdown"))?;

        let topics = if self.topics.is_empty() {
            dispatcher.topics().into_iter().map(str::to_string).collect()
        } else {
            self.topics
        };
        if topics.is_empty() {
            return Err(ConfigurationError::InvalidSetting {
                key: "topics".to_string(),
                reason: "no topics configured and no handlers registered".to_string(),
            });
        }

        let name = self.name.unwrap_or_else(|| "translator".to_string());
        Ok(TranslatorConsumer {
            lanes: self.lanes.unwrap_or(DEFAULT_LANES).max(1),
            lane: Arc::new(Lane {
                consumer: name.clone(),
                dispatcher,
                redelivery: self.redelivery.unwrap_or_default(),
                dead_letters: self.dead_letters.unwrap_or_default(),
                processed: self.processed,
            }),
            name,
            topics,
            transport,
            shutdown,
            retry_delay: self.retry_delay.unwrap_or_else(|| Duration::from_secs(5)),
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::registry::HandlerRegistry;
    use event_translator_testing::InMemoryTransport;
    use proptest::prelude::*;

    #[test]
    fn stream_id_takes_precedence_over_id() {
        let ordered = Envelope::builder()
            .id("m1")
            .name("X-changed")
            .stream_id(Some("case-1".to_string()))
            .build()
            .unwrap();
        let unordered = Envelope::builder().id("m2").name("X-changed").build().unwrap();

        assert_eq!(ordering_key(&ordered), "case-1");
        assert_eq!(ordering_key(&unordered), "m2");
    }

    #[test]
    fn build_requires_wiring() {
        let (_tx, rx) = broadcast::channel(1);
        let result = TranslatorConsumer::builder().shutdown(rx).build();
        assert!(matches!(result, Err(ConfigurationError::MissingSetting("transport"))));
    }

    #[test]
    fn empty_registry_without_topics_is_rejected() {
        let (_tx, rx) = broadcast::channel(1);
        let result = TranslatorConsumer::builder()
            .transport(Arc::new(InMemoryTransport::new()))
            .dispatcher(Arc::new(HandlerRegistry::builder().build()))
            .shutdown(rx)
            .build();
        assert!(matches!(result, Err(ConfigurationError::InvalidSetting { .. })));
    }

    proptest! {
        #[test]
        fn lanes_are_stable_and_in_range(key in "[a-z0-9-]{1,24}", lanes in 1usize..64) {
            let lane = lane_for(&key, lanes);
            prop_assert!(lane < lanes);
            prop_assert_eq!(lane, lane_for(&key, lanes));
        }
    }
}
