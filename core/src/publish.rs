//! Outbound message specs and the Publisher seam.
//!
//! A Transformer only declares *what* to publish ([`OutboundSpec`]). The
//! [`Publisher`] turns each spec into a full [`Envelope`] by stamping the
//! inbound message's correlation identity onto it
//! ([`CorrelationContext`]) and hands it to the transport.

use crate::envelope::{Envelope, EnvelopeError, PayloadError, UserContext};
use crate::transport::TransportError;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// A Transformer's declared intent to publish one message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutboundSpec {
    name: String,
    payload: Value,
    stream_id: Option<String>,
}

impl OutboundSpec {
    /// Spec with an explicit JSON payload.
    #[must_use]
    pub fn new(name: impl Into<String>, payload: Value) -> Self {
        Self {
            name: name.into(),
            payload,
            stream_id: None,
        }
    }

    /// Spec whose payload is a serialized record.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] if `record` cannot be represented as JSON.
    pub fn from_record<T: Serialize>(name: impl Into<String>, record: &T) -> Result<Self, PayloadError> {
        let name = name.into();
        let payload = serde_json::to_value(record).map_err(|e| PayloadError::new(&name, e))?;
        Ok(Self::new(name, payload))
    }

    /// Address the message at another stream than the inbound one.
    #[must_use]
    pub fn on_stream(mut self, stream_id: impl Into<String>) -> Self {
        self.stream_id = Some(stream_id.into());
        self
    }

    /// Outbound message name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Outbound payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Stream override, if any.
    #[must_use]
    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }
}

/// Correlation identity carried from an inbound envelope to everything it produces.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CorrelationContext {
    correlation_id: String,
    causation_id: String,
    stream_id: Option<String>,
    user_context: Option<UserContext>,
    created_at: DateTime<Utc>,
    occurrence: usize,
}

impl CorrelationContext {
    /// Capture the identity of `inbound`.
    ///
    /// `causation_id` becomes the inbound message's `id`; the correlation id
    /// is propagated unchanged.
    #[must_use]
    pub fn from_inbound(inbound: &Envelope) -> Self {
        Self {
            correlation_id: inbound.correlation_id().to_string(),
            causation_id: inbound.id().to_string(),
            stream_id: inbound.stream_id().map(str::to_string),
            user_context: inbound.user_context().cloned(),
            created_at: inbound.created_at(),
            occurrence: 0,
        }
    }

    /// The same context for the `occurrence`-th message of a fan-out that
    /// shares its name and target stream with earlier ones.
    #[must_use]
    pub fn nth(&self, occurrence: usize) -> Self {
        Self {
            occurrence,
            ..self.clone()
        }
    }

    /// Correlation id of the causal chain.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Id of the inbound message.
    #[must_use]
    pub fn causation_id(&self) -> &str {
        &self.causation_id
    }

    /// Inbound stream id.
    #[must_use]
    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    /// Inbound user context.
    #[must_use]
    pub const fn user_context(&self) -> Option<&UserContext> {
        self.user_context.as_ref()
    }

    /// Zero-based count of earlier messages in the fan-out with the same
    /// name and target stream.
    #[must_use]
    pub const fn occurrence(&self) -> usize {
        self.occurrence
    }

    /// Stream `spec` is addressed at: its override, else the inbound stream.
    #[must_use]
    pub fn target_stream<'s>(&'s self, spec: &'s OutboundSpec) -> Option<&'s str> {
        spec.stream_id().or(self.stream_id())
    }

    /// Build the outbound envelope for `spec` with the given message id.
    ///
    /// The creation time is inherited from the inbound envelope so a replay
    /// of the same inbound message yields identical outbound envelopes.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError`] if the spec's name or the id is empty.
    pub fn envelope_for(&self, spec: &OutboundSpec, id: impl Into<String>) -> Result<Envelope, EnvelopeError> {
        Envelope::builder()
            .id(id)
            .name(spec.name())
            .correlation_id(&self.correlation_id)
            .causation_id(&self.causation_id)
            .stream_id(self.target_stream(spec).map(str::to_string))
            .user_context(self.user_context.clone())
            .created_at(self.created_at)
            .payload(spec.payload().clone())
            .build()
    }
}

/// Errors raised while publishing an outbound spec.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// The spec could not be turned into a valid envelope.
    #[error("Invalid outbound message: {0}")]
    InvalidSpec(#[from] EnvelopeError),

    /// The transport refused the envelope.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl PublishError {
    /// Whether publishing again may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Emits outbound specs through the transport.
///
/// A call must complete (or fail) before the Handler returns, so no
/// derivative message is in flight when a dispatch reports success.
pub trait Publisher: Send + Sync {
    /// Build the outbound envelope for `spec` under `context` and emit it.
    ///
    /// Returns the envelope that was handed to the transport.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError`] if the envelope is invalid or the transport
    /// refused it.
    fn publish<'a>(
        &'a self,
        spec: &'a OutboundSpec,
        context: &'a CorrelationContext,
    ) -> Pin<Box<dyn Future<Output = Result<Envelope, PublishError>> + Send + 'a>>;
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn inbound() -> Envelope {
        Envelope::builder()
            .id("m1")
            .name("X-changed")
            .correlation_id("c1")
            .stream_id(Some("e1".to_string()))
            .user_context(Some(UserContext::user("u1")))
            .payload(json!({ "entityId": "e1" }))
            .build()
            .unwrap()
    }

    #[test]
    fn outbound_envelope_carries_inbound_identity() {
        let inbound = inbound();
        let context = CorrelationContext::from_inbound(&inbound);
        let spec = OutboundSpec::new("public.X-changed", json!({ "entityId": "e1" }));

        let outbound = context.envelope_for(&spec, "o1").unwrap();

        assert_eq!(outbound.correlation_id(), "c1");
        assert_eq!(outbound.causation_id(), Some("m1"));
        assert_eq!(outbound.stream_id(), Some("e1"));
        assert_eq!(outbound.user_context(), Some(&UserContext::user("u1")));
        assert_eq!(outbound.created_at(), inbound.created_at());
    }

    #[test]
    fn stream_override_wins() {
        let context = CorrelationContext::from_inbound(&inbound());
        let spec = OutboundSpec::new("cmd", json!({})).on_stream("case-9");

        let outbound = context.envelope_for(&spec, "o1").unwrap();
        assert_eq!(outbound.stream_id(), Some("case-9"));
    }

    #[test]
    fn empty_outbound_name_is_invalid() {
        let context = CorrelationContext::from_inbound(&inbound());
        let spec = OutboundSpec::new("", json!({}));
        assert_eq!(
            context.envelope_for(&spec, "o1"),
            Err(EnvelopeError::EmptyName)
        );
    }

    #[test]
    fn occurrences_are_independent_copies() {
        let context = CorrelationContext::from_inbound(&inbound());
        let third = context.nth(2);
        assert_eq!(third.occurrence(), 2);
        assert_eq!(context.occurrence(), 0);
        assert_eq!(third.causation_id(), "m1");
    }

    #[test]
    fn target_stream_prefers_the_override() {
        let context = CorrelationContext::from_inbound(&inbound());
        let inherited = OutboundSpec::new("public.X-changed", json!({}));
        let addressed = OutboundSpec::new("cmd", json!({})).on_stream("case-9");

        assert_eq!(context.target_stream(&inherited), Some("e1"));
        assert_eq!(context.target_stream(&addressed), Some("case-9"));
    }

    #[test]
    fn from_record_serializes_payload() {
        #[derive(Serialize)]
        #[serde(rename_all = "camelCase")]
        struct Mirror {
            entity_id: String,
        }

        let spec = OutboundSpec::from_record(
            "public.X-changed",
            &Mirror {
                entity_id: "e1".to_string(),
            },
        )
        .unwrap();
        assert_eq!(spec.payload(), &json!({ "entityId": "e1" }));
    }
}
