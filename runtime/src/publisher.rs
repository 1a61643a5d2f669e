//! Transport-backed Publisher with deterministic outbound ids.
//!
//! Every outbound envelope gets an id derived from the inbound message id,
//! its name, its target stream and how many earlier messages of the same
//! fan-out share that name and stream. Re-dispatching the same inbound
//! envelope therefore republishes identical envelopes, even when enrichment
//! answers changed in between and the fan-out grew or shrank around them.
//! Downstream consumers can de-duplicate by message id.

use event_translator_core::envelope::Envelope;
use event_translator_core::publish::{CorrelationContext, OutboundSpec, PublishError, Publisher};
use event_translator_core::transport::Transport;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use uuid::Uuid;

/// Namespace for outbound message ids (UUID v5).
pub const OUTBOUND_ID_NAMESPACE: Uuid = Uuid::from_u128(0x6f1c_2a4e_93d5_4b0e_8c7a_5e21_d0f4_b9a3);

/// Deterministic id for the `occurrence`-th outbound message named `name`
/// addressed at `stream_id` and caused by message `causation_id`.
#[must_use]
pub fn outbound_id(
    causation_id: &str,
    name: &str,
    stream_id: Option<&str>,
    occurrence: usize,
) -> String {
    let seed = format!(
        "{causation_id}/{name}/{}/{occurrence}",
        stream_id.unwrap_or_default()
    );
    Uuid::new_v5(&OUTBOUND_ID_NAMESPACE, seed.as_bytes()).to_string()
}

/// Id for `spec` published under `context`.
#[must_use]
pub fn outbound_id_for(spec: &OutboundSpec, context: &CorrelationContext) -> String {
    outbound_id(
        context.causation_id(),
        spec.name(),
        context.target_stream(spec),
        context.occurrence(),
    )
}

/// Publishes outbound specs through a [`Transport`].
#[derive(Clone)]
pub struct EnvelopePublisher {
    transport: Arc<dyn Transport>,
}

impl EnvelopePublisher {
    /// Publisher over `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }
}

impl Publisher for EnvelopePublisher {
    fn publish<'a>(
        &'a self,
        spec: &'a OutboundSpec,
        context: &'a CorrelationContext,
    ) -> Pin<Box<dyn Future<Output = Result<Envelope, PublishError>> + Send + 'a>> {
        Box::pin(async move {
            let envelope = context.envelope_for(spec, outbound_id_for(spec, context))?;

            if let Err(e) = self.transport.publish(&envelope).await {
                tracing::warn!(
                    outbound = %envelope.name(),
                    outbound_id = %envelope.id(),
                    error = %e,
                    "Failed to publish outbound message"
                );
                metrics::counter!("translator_publish_errors_total").increment(1);
                return Err(e.into());
            }

            tracing::debug!(
                outbound = %envelope.name(),
                outbound_id = %envelope.id(),
                occurrence = context.occurrence(),
                "Published outbound message"
            );
            metrics::counter!("translator_published_total", "name" => envelope.name().to_string())
                .increment(1);
            Ok(envelope)
        })
    }
}

impl std::fmt::Debug for EnvelopePublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvelopePublisher").finish_non_exhaustive()
    }
}
