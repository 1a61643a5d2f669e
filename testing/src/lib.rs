//! # Event Translator Testing
//!
//! Testing utilities and in-memory doubles for event translators.
//!
//! This crate provides:
//! - [`InMemoryTransport`]: broker double with buffering, ack tracking and redelivery
//! - [`ScriptedEnrichmentClient`]: answers queries from a script; unscripted means not found
//! - [`RecordingPublisher`]: records outbound envelopes with production ids and correlation
//! - [`ToggleFeatureGate`]: flags that tests flip between dispatches
//! - [`TranslatorTest`]: Given-When-Then harness for translators
//! - [`strategies`]: proptest strategies for envelopes
//!
//! ## Example
//!
//! ```ignore
//! use event_translator_testing::{TranslatorTest, fixtures::envelope};
//!
//! #[tokio::test]
//! async fn mirrors_entity_changes() {
//!     TranslatorTest::new("X-changed", |t| t.transformer(mirror))
//!         .when(envelope("m1", "X-changed", json!({ "entityId": "e1" })))
//!         .then_published(|published| {
//!             assert_eq!(published[0].causation_id(), Some("m1"));
//!         })
//!         .run()
//!         .await;
//! }
//! ```

pub mod enrichment;
pub mod feature;
pub mod publisher;
pub mod strategies;
pub mod transport;

/// Envelope fixtures and test setup helpers.
pub mod fixtures {
    use event_translator_core::envelope::Envelope;
    use serde_json::Value;

    /// Inbound envelope with the given id, name and payload.
    ///
    /// # Panics
    ///
    /// Panics if `id` or `name` is blank.
    #[must_use]
    #[allow(clippy::expect_used)] // Test fixture
    pub fn envelope(id: &str, name: &str, payload: Value) -> Envelope {
        Envelope::builder()
            .id(id)
            .name(name)
            .payload(payload)
            .build()
            .expect("fixture envelope must have an id and a name")
    }

    /// Inbound envelope on an ordered stream.
    ///
    /// # Panics
    ///
    /// Panics if `id` or `name` is blank.
    #[must_use]
    #[allow(clippy::expect_used)] // Test fixture
    pub fn stream_envelope(id: &str, name: &str, stream_id: &str, payload: Value) -> Envelope {
        Envelope::builder()
            .id(id)
            .name(name)
            .stream_id(Some(stream_id.to_string()))
            .payload(payload)
            .build()
            .expect("fixture envelope must have an id and a name")
    }

    /// Install a test tracing subscriber once; later calls are no-ops.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    }
}

pub use enrichment::ScriptedEnrichmentClient;
pub use feature::ToggleFeatureGate;
pub use publisher::RecordingPublisher;
pub use transport::InMemoryTransport;
pub use translator_test::TranslatorTest;
