//! Redpanda transport for the event translator.
//!
//! This crate provides a Redpanda-backed implementation of the [`Transport`]
//! trait from `event-translator-core`. It uses rdkafka, so any
//! Kafka-compatible broker works (Redpanda, Apache Kafka, MSK, Event Hubs).
//!
//! # Wire Format
//!
//! Each record carries one envelope as JSON (see [`Envelope::to_json_bytes`]).
//! The record topic is [`topic_for`] the envelope name and the record key is
//! the envelope's `stream_id` (falling back to its id), so every message of a
//! stream lands on the same partition and keeps its order.
//!
//! # Delivery Semantics
//!
//! **At-least-once delivery** with manual offset commits:
//! - Offsets are committed when the translator acknowledges a delivery, not
//!   when it is received
//! - Acknowledgements may arrive out of order (several lanes process one
//!   partition); the committed position only moves past an offset once every
//!   lower offset of the partition is acknowledged
//! - If the process crashes before commit, records are redelivered, so
//!   dispatch must be idempotent
//!
//! Records that are not valid envelopes are surfaced as
//! [`TransportError::DeserializationFailed`] and committed past.
//!
//! # Example
//!
//! ```no_run
//! use event_translator_redpanda::RedpandaTransport;
//! use event_translator_core::transport::Transport;
//! use futures::StreamExt;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = RedpandaTransport::builder()
//!     .brokers("localhost:9092")
//!     .consumer_group("event-translator")
//!     .build()?;
//!
//! let mut deliveries = transport.subscribe(&["public"]).await?;
//! while let Some(delivery) = deliveries.next().await {
//!     let delivery = delivery?;
//!     println!("{}", delivery.envelope().name());
//!     delivery.ack().await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod offsets;

pub use offsets::{CommitTracker, PartitionOffsets};

use event_translator_core::envelope::Envelope;
use event_translator_core::transport::{
    Acknowledge, Delivery, DeliveryStream, Transport, TransportError, topic_for,
};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{Offset, TopicPartitionList};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Default number of deliveries buffered between the broker and the consumer.
pub const DEFAULT_BUFFER_SIZE: usize = 1000;

/// Default offset reset policy for new consumer groups.
pub const DEFAULT_AUTO_OFFSET_RESET: &str = "earliest";

/// Record key for an envelope: its stream id, or its id when it has none.
#[must_use]
pub fn record_key(envelope: &Envelope) -> &str {
    envelope.stream_id().unwrap_or_else(|| envelope.id())
}

/// Redpanda-backed [`Transport`].
///
/// One producer is shared by every publish; each [`Transport::subscribe`]
/// call creates its own consumer in the configured consumer group.
///
/// # Example
///
/// ```no_run
/// use event_translator_redpanda::RedpandaTransport;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = RedpandaTransport::new("localhost:9092")?;
/// # Ok(())
/// # }
/// ```
pub struct RedpandaTransport {
    producer: FutureProducer,
    brokers: String,
    timeout: Duration,
    consumer_group: Option<String>,
    buffer_size: usize,
    auto_offset_reset: String,
}

impl RedpandaTransport {
    /// Create a transport with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if the producer cannot
    /// be created.
    pub fn new(brokers: &str) -> Result<Self, TransportError> {
        Self::builder().brokers(brokers).build()
    }

    /// Create a builder for custom configuration.
    #[must_use]
    pub fn builder() -> RedpandaTransportBuilder {
        RedpandaTransportBuilder::default()
    }

    /// Broker list this transport connects to.
    #[must_use]
    pub fn brokers(&self) -> &str {
        &self.brokers
    }

    fn consumer_group_for(&self, topics: &[String]) -> String {
        self.consumer_group.clone().unwrap_or_else(|| {
            let mut sorted = topics.to_vec();
            sorted.sort();
            format!("event-translator-{}", sorted.join("-"))
        })
    }
}

/// Builder for [`RedpandaTransport`].
#[derive(Default)]
pub struct RedpandaTransportBuilder {
    brokers: Option<String>,
    producer_acks: Option<String>,
    compression: Option<String>,
    timeout: Option<Duration>,
    consumer_group: Option<String>,
    buffer_size: Option<usize>,
    auto_offset_reset: Option<String>,
}

impl RedpandaTransportBuilder {
    /// Comma-separated broker list (e.g. `"localhost:9092"`).
    #[must_use]
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.brokers = Some(brokers.into());
        self
    }

    /// Producer acknowledgement level: `"0"`, `"1"` or `"all"` (default `"all"`).
    #[must_use]
    pub fn producer_acks(mut self, acks: impl Into<String>) -> Self {
        self.producer_acks = Some(acks.into());
        self
    }

    /// Compression codec: `none`, `gzip`, `snappy`, `lz4`, `zstd` (default `none`).
    #[must_use]
    pub fn compression(mut self, compression: impl Into<String>) -> Self {
        self.compression = Some(compression.into());
        self
    }

    /// Publish timeout (default 5 seconds).
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Consumer group shared by every translator instance.
    ///
    /// Without one, the group id is derived from the subscribed topics.
    #[must_use]
    pub fn consumer_group(mut self, consumer_group: impl Into<String>) -> Self {
        self.consumer_group = Some(consumer_group.into());
        self
    }

    /// Deliveries buffered ahead of the consumer (default 1000).
    #[must_use]
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = Some(buffer_size.max(1));
        self
    }

    /// Where a new consumer group starts reading: `earliest` or `latest`
    /// (default `earliest`).
    #[must_use]
    pub fn auto_offset_reset(mut self, policy: impl Into<String>) -> Self {
        self.auto_offset_reset = Some(policy.into());
        self
    }

    /// Build the transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ConnectionFailed`] if:
    /// - Brokers not set
    /// - Cannot create producer
    pub fn build(self) -> Result<RedpandaTransport, TransportError> {
        let brokers = self
            .brokers
            .ok_or_else(|| TransportError::ConnectionFailed("Brokers not configured".to_string()))?;
        let acks = self.producer_acks.as_deref().unwrap_or("all");
        let compression = self.compression.as_deref().unwrap_or("none");
        let timeout = self.timeout.unwrap_or(Duration::from_secs(5));

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", timeout.as_millis().to_string())
            .set("acks", acks)
            .set("compression.type", compression)
            .create()
            .map_err(|e| {
                TransportError::ConnectionFailed(format!("Failed to create producer: {e}"))
            })?;

        let buffer_size = self.buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let auto_offset_reset = self
            .auto_offset_reset
            .unwrap_or_else(|| DEFAULT_AUTO_OFFSET_RESET.to_string());

        tracing::info!(
            brokers = %brokers,
            acks,
            compression,
            buffer_size,
            auto_offset_reset = %auto_offset_reset,
            "RedpandaTransport created"
        );

        Ok(RedpandaTransport {
            producer,
            brokers,
            timeout,
            consumer_group: self.consumer_group,
            buffer_size,
            auto_offset_reset,
        })
    }
}

/// Commits a record's offset once it and every earlier record are acked.
struct RedpandaAck {
    consumer: Arc<StreamConsumer>,
    tracker: Arc<Mutex<CommitTracker>>,
    topic: String,
    partition: i32,
    offset: i64,
}

impl RedpandaAck {
    fn commit(&self) -> Result<(), TransportError> {
        let position = self
            .tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .ack(&self.topic, self.partition, self.offset);
        let Some(position) = position else {
            return Ok(());
        };

        let mut positions = TopicPartitionList::new();
        positions
            .add_partition_offset(&self.topic, self.partition, Offset::Offset(position))
            .map_err(|e| TransportError::AcknowledgeFailed(e.to_string()))?;
        self.consumer
            .commit(&positions, CommitMode::Async)
            .map_err(|e| TransportError::AcknowledgeFailed(e.to_string()))?;

        tracing::trace!(
            topic = %self.topic,
            partition = self.partition,
            position,
            "Committed offset"
        );
        Ok(())
    }
}

impl Acknowledge for RedpandaAck {
    fn ack(&self) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        Box::pin(async move { self.commit() })
    }
}

impl Transport for RedpandaTransport {
    fn publish(
        &self,
        envelope: &Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), TransportError>> + Send + '_>> {
        let encoded = envelope.to_json_bytes();
        let name = envelope.name().to_string();
        let key = record_key(envelope).to_string();
        let id = envelope.id().to_string();

        Box::pin(async move {
            let payload = encoded.map_err(|e| TransportError::PublishFailed {
                name: name.clone(),
                reason: format!("Failed to serialize envelope: {e}"),
            })?;
            let topic = topic_for(&name);

            let record = FutureRecord::to(topic).payload(&payload).key(&key);

            match self.producer.send(record, Timeout::After(self.timeout)).await {
                Ok((partition, offset)) => {
                    tracing::debug!(
                        topic,
                        partition,
                        offset,
                        name = %name,
                        id = %id,
                        "Envelope published"
                    );
                    Ok(())
                }
                Err((kafka_error, _)) => {
                    tracing::error!(
                        topic,
                        name = %name,
                        error = %kafka_error,
                        "Failed to publish envelope"
                    );
                    Err(TransportError::PublishFailed {
                        name,
                        reason: kafka_error.to_string(),
                    })
                }
            }
        })
    }

    fn subscribe(
        &self,
        topics: &[&str],
    ) -> Pin<Box<dyn Future<Output = Result<DeliveryStream, TransportError>> + Send + '_>> {
        let topics: Vec<String> = topics.iter().map(|s| (*s).to_string()).collect();

        Box::pin(async move {
            let consumer_group = self.consumer_group_for(&topics);

            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", &self.brokers)
                .set("group.id", &consumer_group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", &self.auto_offset_reset)
                .set("session.timeout.ms", "6000")
                .set("enable.partition.eof", "false")
                .create()
                .map_err(|e| TransportError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to create consumer: {e}"),
                })?;

            let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
            consumer
                .subscribe(&topic_refs)
                .map_err(|e| TransportError::SubscriptionFailed {
                    topics: topics.clone(),
                    reason: format!("Failed to subscribe to topics: {e}"),
                })?;

            tracing::info!(
                topics = ?topics,
                consumer_group = %consumer_group,
                buffer_size = self.buffer_size,
                auto_offset_reset = %self.auto_offset_reset,
                "Subscribed to topics"
            );

            let consumer = Arc::new(consumer);
            let tracker = Arc::new(Mutex::new(CommitTracker::new()));
            let (tx, rx) = tokio::sync::mpsc::channel(self.buffer_size);

            tokio::spawn(forward(consumer, tracker, tx));

            let stream = async_stream::stream! {
                let mut rx = rx;
                while let Some(result) = rx.recv().await {
                    yield result;
                }
            };

            Ok(Box::pin(stream) as DeliveryStream)
        })
    }
}

/// Move records from the consumer into the delivery channel until the
/// receiving side goes away.
async fn forward(
    consumer: Arc<StreamConsumer>,
    tracker: Arc<Mutex<CommitTracker>>,
    tx: tokio::sync::mpsc::Sender<Result<Delivery, TransportError>>,
) {
    use futures::StreamExt;

    let mut stream = consumer.stream();

    while let Some(received) = stream.next().await {
        let message = match received {
            Ok(message) => message,
            Err(e) => {
                let error = TransportError::Other(format!("Failed to receive record: {e}"));
                if tx.send(Err(error)).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let acker = Arc::new(RedpandaAck {
            consumer: Arc::clone(&consumer),
            tracker: Arc::clone(&tracker),
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        });
        tracker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .track(&acker.topic, acker.partition, acker.offset);

        let decoded = message
            .payload()
            .ok_or_else(|| "Record has no payload".to_string())
            .and_then(|payload| Envelope::from_json_bytes(payload).map_err(|e| e.to_string()));

        match decoded {
            Ok(envelope) => {
                tracing::trace!(
                    topic = %acker.topic,
                    partition = acker.partition,
                    offset = acker.offset,
                    name = %envelope.name(),
                    "Received envelope"
                );
                if tx.send(Ok(Delivery::new(envelope, acker))).await.is_err() {
                    tracing::debug!("Delivery receiver dropped, exiting consumer task");
                    break;
                }
            }
            Err(reason) => {
                tracing::warn!(
                    topic = %acker.topic,
                    partition = acker.partition,
                    offset = acker.offset,
                    reason = %reason,
                    "Skipping record that is not an envelope"
                );
                let error = TransportError::DeserializationFailed(reason);
                if tx.send(Err(error)).await.is_err() {
                    break;
                }
                if let Err(e) = acker.commit() {
                    tracing::warn!(error = %e, "Failed to commit past undecodable record");
                }
            }
        }
    }

    tracing::debug!("Consumer task exiting");
}
