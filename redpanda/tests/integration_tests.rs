//! Integration tests for [`RedpandaTransport`] against a running broker.
//!
//! These tests validate:
//! - Publish/subscribe round-trip of envelopes
//! - Per-stream ordering through the record key
//! - Redelivery of unacknowledged records to the next consumer in the group
//!
//! # Running These Tests
//!
//! These tests are marked as `#[ignore]` by default because they need a
//! Kafka-compatible broker with topic auto-creation enabled:
//!
//! ```bash
//! docker run -d -p 9092:9092 redpandadata/redpanda redpanda start --smp 1 \
//!     --kafka-addr 0.0.0.0:9092 --advertise-kafka-addr localhost:9092
//! REDPANDA_BROKERS=localhost:9092 \
//!     cargo test -p event-translator-redpanda --test integration_tests -- --ignored
//! ```

#![allow(clippy::expect_used)]
#![allow(clippy::panic)]

use event_translator_core::envelope::Envelope;
use event_translator_core::transport::{DeliveryStream, Transport};
use event_translator_redpanda::RedpandaTransport;
use futures::StreamExt;
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

fn brokers() -> String {
    std::env::var("REDPANDA_BROKERS").unwrap_or_else(|_| "localhost:9092".to_string())
}

/// A topic nobody else has written to.
fn fresh_topic(label: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    format!("it-{label}-{nanos}")
}

fn transport(group: &str) -> RedpandaTransport {
    RedpandaTransport::builder()
        .brokers(brokers())
        .consumer_group(group)
        .auto_offset_reset("earliest")
        .build()
        .expect("Failed to create transport")
}

fn envelope(topic: &str, id: &str, stream_id: &str, seq: u32) -> Envelope {
    Envelope::builder()
        .id(id)
        .name(format!("{topic}.X-changed"))
        .stream_id(Some(stream_id.to_string()))
        .payload(json!({ "seq": seq }))
        .build()
        .expect("Failed to build envelope")
}

async fn receive(stream: &mut DeliveryStream, count: usize) -> Vec<Envelope> {
    let mut received = Vec::new();
    tokio::time::timeout(Duration::from_secs(30), async {
        while received.len() < count {
            if let Some(result) = stream.next().await {
                let delivery = result.expect("Failed to receive delivery");
                received.push(delivery.envelope().clone());
                delivery.ack().await.expect("Failed to ack");
            }
        }
    })
    .await
    .expect("Timeout waiting for deliveries");
    received
}

#[tokio::test]
#[ignore]
async fn test_publish_and_subscribe_round_trip() {
    let topic = fresh_topic("round-trip");
    let transport = transport(&format!("{topic}-group"));

    let original = envelope(&topic, "m1", "case-1", 1);
    transport.publish(&original).await.expect("Failed to publish");

    let mut stream = transport.subscribe(&[&topic]).await.expect("Failed to subscribe");
    let received = receive(&mut stream, 1).await;

    assert_eq!(received, vec![original]);
}

#[tokio::test]
#[ignore]
async fn test_stream_order_is_preserved() {
    let topic = fresh_topic("ordering");
    let transport = transport(&format!("{topic}-group"));

    for seq in 0..20 {
        let stream_id = if seq % 2 == 0 { "case-a" } else { "case-b" };
        transport
            .publish(&envelope(&topic, &format!("m{seq}"), stream_id, seq))
            .await
            .expect("Failed to publish");
    }

    let mut stream = transport.subscribe(&[&topic]).await.expect("Failed to subscribe");
    let received = receive(&mut stream, 20).await;

    for stream_id in ["case-a", "case-b"] {
        let seqs: Vec<u64> = received
            .iter()
            .filter(|e| e.stream_id() == Some(stream_id))
            .filter_map(|e| e.payload()["seq"].as_u64())
            .collect();
        let mut sorted = seqs.clone();
        sorted.sort_unstable();
        assert_eq!(seqs, sorted, "stream {stream_id} reordered");
    }
}

#[tokio::test]
#[ignore]
async fn test_unacked_records_are_redelivered() {
    let topic = fresh_topic("redelivery");
    let group = format!("{topic}-group");

    let first = transport(&group);
    first
        .publish(&envelope(&topic, "m1", "case-1", 1))
        .await
        .expect("Failed to publish");

    {
        let mut stream = first.subscribe(&[&topic]).await.expect("Failed to subscribe");
        let delivery = tokio::time::timeout(Duration::from_secs(30), stream.next())
            .await
            .expect("Timeout waiting for delivery")
            .expect("Stream ended")
            .expect("Failed to receive delivery");
        assert_eq!(delivery.envelope().id(), "m1");
        // dropped without ack
    }
    drop(first);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let second = transport(&group);
    let mut stream = second.subscribe(&[&topic]).await.expect("Failed to subscribe");
    let received = receive(&mut stream, 1).await;

    assert_eq!(received[0].id(), "m1");
}
