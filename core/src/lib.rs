//! # Event Translator Core
//!
//! Core traits and types for event translators.
//!
//! A translator consumes private events of one bounded context and, after
//! optionally enriching them with synchronous reads against other contexts,
//! republishes derivative messages: public events, commands, or both. This
//! crate defines the vocabulary; the runtime crate wires it together.
//!
//! ## Core Concepts
//!
//! - **Envelope**: Immutable metadata plus an opaque JSON payload
//! - **Handler**: Processes every inbound envelope of one registered name
//! - **`EnrichmentClient`**: Answers queries; absence is a value, not an error
//! - **Transformer**: Pure `(Envelope, Enrichments) → Vec<OutboundSpec>`
//! - **Publisher**: Stamps correlation identity onto outbound messages
//! - **`FeatureGate`**: Read-only flag lookup, evaluated per dispatch
//! - **Transport**: Broker boundary (subscribe, publish, acknowledge)
//!
//! ## Correlation
//!
//! Every message produced while handling an inbound envelope carries the
//! inbound `correlationId` unchanged and `causationId = inbound.id`.
//!
//! ## Example
//!
//! ```
//! use event_translator_core::prelude::*;
//! use serde_json::json;
//!
//! struct Mirror;
//!
//! impl Transformer for Mirror {
//!     fn transform(
//!         &self,
//!         envelope: &Envelope,
//!         _context: &TransformContext<'_>,
//!     ) -> Result<Vec<OutboundSpec>, TransformError> {
//!         Ok(vec![OutboundSpec::new(
//!             format!("public.{}", envelope.name()),
//!             envelope.payload().clone(),
//!         )])
//!     }
//! }
//!
//! let envelope = Envelope::builder()
//!     .id("m1")
//!     .name("X-changed")
//!     .payload(json!({ "entityId": "e1" }))
//!     .build()
//!     .unwrap();
//! let enrichments = Enrichments::new();
//! let context = TransformContext::new(&enrichments, &AllFeaturesEnabled);
//!
//! let specs = Mirror.transform(&envelope, &context).unwrap();
//! assert_eq!(specs[0].name(), "public.X-changed");
//! ```

pub use chrono::{DateTime, Utc};

pub mod enrichment;
pub mod envelope;
pub mod fan_out;
pub mod feature;
pub mod handler;
pub mod projection;
pub mod publish;
pub mod transform;
pub mod transport;

/// Commonly used types, for glob import.
pub mod prelude {
    pub use crate::enrichment::{
        EnrichmentClient, EnrichmentError, EnrichmentQuery, EnrichmentResult, Enrichments,
    };
    pub use crate::envelope::{Envelope, EnvelopeError, Metadata, PayloadError, UserContext};
    pub use crate::fan_out::FanOut;
    pub use crate::feature::{AllFeaturesEnabled, FeatureGate};
    pub use crate::handler::{Handler, HandlerError};
    pub use crate::projection::{PayloadProjection, ProjectionError};
    pub use crate::publish::{CorrelationContext, OutboundSpec, PublishError, Publisher};
    pub use crate::transform::{TransformContext, TransformError, Transformer};
    pub use crate::transport::{Delivery, DeliveryStream, Transport, TransportError};
}
