//! `X-changed` → `public.X-changed`, only for entities the read model knows.

use event_translator_core::envelope::Envelope;
use event_translator_core::publish::OutboundSpec;
use event_translator_core::transform::{TransformContext, TransformError};
use event_translator_runtime::{EnrichmentStep, TranslatorBuilder};
use serde_json::Value;

/// Inbound event name.
pub const NAME: &str = "X-changed";

/// Public event published for every known entity.
pub const PUBLIC_NAME: &str = "public.X-changed";

/// Query resolving an entity by id.
pub const ENTITY_QUERY: &str = "entity.query.by-id";

/// Configure the translator.
#[must_use]
pub fn configure(builder: TranslatorBuilder) -> TranslatorBuilder {
    builder
        .enrich(EnrichmentStep::field("entity", ENTITY_QUERY, "/entityId", "entityId").required())
        .transformer(transform)
}

/// Mirror the payload publicly, adding the entity's current status.
///
/// # Errors
///
/// Returns [`TransformError::Rejected`] if the payload is not an object.
pub fn transform(
    envelope: &Envelope,
    context: &TransformContext<'_>,
) -> Result<Vec<OutboundSpec>, TransformError> {
    let Value::Object(mut payload) = envelope.payload().clone() else {
        return Err(TransformError::Rejected("payload is not an object".to_string()));
    };

    if let Some(status) = context
        .enrichments()
        .value("entity")
        .and_then(|entity| entity.get("status"))
    {
        payload.insert("status".to_string(), status.clone());
    }

    Ok(vec![OutboundSpec::new(PUBLIC_NAME, Value::Object(payload))])
}
