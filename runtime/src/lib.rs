//! # Event Translator Runtime
//!
//! Runtime for event translators: the pieces that turn the core vocabulary
//! into a running process.
//!
//! ## Core Components
//!
//! - **Translator**: The generic Handler (gate → enrich → transform → publish)
//! - **Dispatcher**: Name → Handler routing with a per-dispatch timeout
//! - **`EnvelopePublisher`**: Deterministic outbound ids over a Transport
//! - **`TranslatorConsumer`**: Per-stream ordering lanes, redelivery, dead-lettering
//! - **`HttpEnrichmentClient`**: Query API client where 404 means "not found"
//!
//! ## Example
//!
//! ```ignore
//! use event_translator_runtime::{EnrichmentStep, HandlerRegistry, Translator};
//!
//! let translator = Translator::builder("X-changed")
//!     .enrich(EnrichmentStep::field("entity", "query.entity", "/entityId", "id").required())
//!     .enrichment_client(client)
//!     .transformer(mirror)
//!     .publisher(publisher)
//!     .build()?;
//!
//! let dispatcher = HandlerRegistry::builder()
//!     .register_translator(translator)?
//!     .build();
//!
//! dispatcher.dispatch(&envelope).await?;
//! ```

/// Transport consumer with ordering lanes
pub mod consumer;

/// Process configuration from environment variables
pub mod config;

/// Bounded dead-letter queue
pub mod dead_letter;

/// Dispatch and startup error types
pub mod error;

/// Configuration-backed feature gate
pub mod feature;

/// HTTP enrichment client
pub mod http;

/// Processed message ids for duplicate detection
pub mod idempotency;

/// Prometheus metrics for observability
pub mod metrics;

/// Transport-backed publisher
pub mod publisher;

/// Redelivery with exponential backoff
pub mod redelivery;

/// Handler registry and dispatcher
pub mod registry;

/// Generic enrichment/transform/publish pipeline
pub mod translator;

pub use config::TranslatorConfig;
pub use consumer::{TranslatorConsumer, TranslatorConsumerBuilder, lane_for, ordering_key};
pub use dead_letter::{DeadLetter, DeadLetterQueue};
pub use error::{ConfigurationError, DispatchError, DispatchFailure};
pub use feature::StaticFeatureGate;
pub use http::HttpEnrichmentClient;
pub use idempotency::ProcessedMessages;
pub use metrics::{MetricsError, MetricsServer};
pub use publisher::{EnvelopePublisher, outbound_id, outbound_id_for};
pub use redelivery::RedeliveryPolicy;
pub use registry::{DispatchOutcome, Dispatcher, HandlerRegistry, HandlerRegistryBuilder};
pub use translator::{EnrichmentMode, EnrichmentStep, Translation, Translator, TranslatorBuilder};
