//! Transformer seam: the pure, domain-specific part of a translator.
//!
//! A [`Transformer`] maps the inbound envelope plus collected enrichment
//! results to an ordered list of [`OutboundSpec`]s. It must be
//! deterministic: no randomness and no wall-clock branching. Identifiers it
//! needs downstream must come from the payload itself.

use crate::enrichment::Enrichments;
use crate::envelope::{Envelope, PayloadError};
use crate::feature::FeatureGate;
use crate::projection::ProjectionError;
use crate::publish::OutboundSpec;
use thiserror::Error;

/// Errors a Transformer can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// The inbound payload or an enrichment document had an unexpected shape.
    #[error(transparent)]
    MalformedPayload(#[from] PayloadError),

    /// A declarative payload projection failed.
    #[error(transparent)]
    Projection(#[from] ProjectionError),

    /// The message is well-formed but cannot be translated.
    #[error("Cannot translate message: {0}")]
    Rejected(String),
}

/// What a Transformer may consult besides the inbound envelope.
pub struct TransformContext<'a> {
    enrichments: &'a Enrichments,
    features: &'a dyn FeatureGate,
}

impl<'a> TransformContext<'a> {
    /// Context over the results collected for one dispatch.
    #[must_use]
    pub fn new(enrichments: &'a Enrichments, features: &'a dyn FeatureGate) -> Self {
        Self {
            enrichments,
            features,
        }
    }

    /// Enrichment results collected for this dispatch.
    #[must_use]
    pub const fn enrichments(&self) -> &Enrichments {
        self.enrichments
    }

    /// Evaluate a feature flag now.
    #[must_use]
    pub fn is_enabled(&self, flag: &str) -> bool {
        self.features.is_enabled(flag)
    }
}

/// Pure mapping from (inbound envelope, enrichment results) to outbound specs.
///
/// Functions and closures with the matching signature implement this trait.
pub trait Transformer: Send + Sync {
    /// Produce the ordered list of messages to publish (possibly empty).
    ///
    /// # Errors
    ///
    /// Returns [`TransformError`] when the inbound message cannot be
    /// interpreted.
    fn transform(
        &self,
        envelope: &Envelope,
        context: &TransformContext<'_>,
    ) -> Result<Vec<OutboundSpec>, TransformError>;
}

impl<F> Transformer for F
where
    F: Fn(&Envelope, &TransformContext<'_>) -> Result<Vec<OutboundSpec>, TransformError> + Send + Sync,
{
    fn transform(
        &self,
        envelope: &Envelope,
        context: &TransformContext<'_>,
    ) -> Result<Vec<OutboundSpec>, TransformError> {
        self(envelope, context)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::feature::AllFeaturesEnabled;
    use serde_json::json;

    fn mirror(
        envelope: &Envelope,
        _context: &TransformContext<'_>,
    ) -> Result<Vec<OutboundSpec>, TransformError> {
        Ok(vec![OutboundSpec::new(
            format!("public.{}", envelope.name()),
            envelope.payload().clone(),
        )])
    }

    #[test]
    fn functions_are_transformers() {
        let envelope = Envelope::builder()
            .id("m1")
            .name("X-changed")
            .payload(json!({ "entityId": "e1" }))
            .build()
            .unwrap();
        let enrichments = Enrichments::new();
        let context = TransformContext::new(&enrichments, &AllFeaturesEnabled);

        let specs = mirror.transform(&envelope, &context).unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].name(), "public.X-changed");
        assert!(context.is_enabled("anything"));
    }
}
