//! Envelope and metadata model.
//!
//! Every message flowing through a translator, inbound or outbound, is an
//! [`Envelope`]: immutable metadata plus an opaque JSON payload. The payload
//! schema belongs to the event name, never to this crate; Transformers decode
//! it with [`Envelope::payload_as`].
//!
//! # Wire Format
//!
//! ```json
//! {
//!   "metadata": {
//!     "id": "m1",
//!     "name": "progression.event.hearing-resulted",
//!     "correlationId": "c1",
//!     "causationId": "m0",
//!     "streamId": "hearing-42",
//!     "userContext": { "userId": "u-7" },
//!     "createdAt": "2025-01-01T00:00:00Z"
//!   },
//!   "payload": { "hearingId": "hearing-42" }
//! }
//! ```
//!
//! # Example
//!
//! ```
//! use event_translator_core::envelope::Envelope;
//! use serde_json::json;
//!
//! let envelope = Envelope::builder()
//!     .id("m1")
//!     .name("X-changed")
//!     .correlation_id("c1")
//!     .payload(json!({ "entityId": "e1" }))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(envelope.correlation_id(), "c1");
//! assert!(envelope.causation_id().is_none());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Errors raised while constructing or decoding an envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    /// The logical message name was empty.
    #[error("Envelope name must not be empty")]
    EmptyName,

    /// The message identifier was empty.
    #[error("Envelope id must not be empty")]
    EmptyId,

    /// The bytes on the wire were not a valid envelope document.
    #[error("Failed to decode envelope: {0}")]
    Decode(String),

    /// The envelope could not be encoded for the wire.
    #[error("Failed to encode envelope: {0}")]
    Encode(String),
}

/// A payload (or enrichment value) did not match the shape a Transformer expects.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Malformed payload for '{name}': {reason}")]
pub struct PayloadError {
    /// Name of the message or document that failed to decode.
    pub name: String,
    /// Decoder message.
    pub reason: String,
}

impl PayloadError {
    /// Create a payload error for the named document.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self {
            name: name.into(),
            reason: reason.to_string(),
        }
    }
}

/// Acting user/client identity, propagated for audit.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    /// Acting user, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Acting client application, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

impl UserContext {
    /// Context for a user acting through no particular client.
    #[must_use]
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            client_id: None,
        }
    }
}

/// Envelope metadata.
///
/// Read-only once built; see [`EnvelopeBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    id: String,
    name: String,
    correlation_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    causation_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_context: Option<UserContext>,
    created_at: DateTime<Utc>,
}

impl Metadata {
    /// Unique message identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Logical, namespaced message name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier shared by every message of the causal chain.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Identifier of the immediate predecessor message.
    #[must_use]
    pub fn causation_id(&self) -> Option<&str> {
        self.causation_id.as_deref()
    }

    /// Aggregate/stream this message pertains to.
    #[must_use]
    pub fn stream_id(&self) -> Option<&str> {
        self.stream_id.as_deref()
    }

    /// Acting user/client identity.
    #[must_use]
    pub const fn user_context(&self) -> Option<&UserContext> {
        self.user_context.as_ref()
    }

    /// When the message was created.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Immutable message wrapper: metadata plus a structured payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireEnvelope")]
pub struct Envelope {
    metadata: Metadata,
    payload: Value,
}

impl Envelope {
    /// Start building an envelope.
    #[must_use]
    pub fn builder() -> EnvelopeBuilder {
        EnvelopeBuilder::default()
    }

    /// Envelope metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Unique message identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        self.metadata.id()
    }

    /// Logical, namespaced message name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.metadata.name()
    }

    /// Correlation identifier of the causal chain.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        self.metadata.correlation_id()
    }

    /// Identifier of the immediate predecessor message.
    #[must_use]
    pub fn causation_id(&self) -> Option<&str> {
        self.metadata.causation_id()
    }

    /// Stream identifier used for ordering.
    #[must_use]
    pub fn stream_id(&self) -> Option<&str> {
        self.metadata.stream_id()
    }

    /// Acting user/client identity.
    #[must_use]
    pub const fn user_context(&self) -> Option<&UserContext> {
        self.metadata.user_context()
    }

    /// Creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.metadata.created_at()
    }

    /// Raw structured payload.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Decode the payload into a typed record.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] when the payload does not have the shape of `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, PayloadError> {
        T::deserialize(&self.payload).map_err(|e| PayloadError::new(self.name(), e))
    }

    /// Encode to the JSON wire format.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Encode`] if serialization fails.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(|e| EnvelopeError::Encode(e.to_string()))
    }

    /// Decode from the JSON wire format, re-validating metadata.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::Decode`] for malformed documents and
    /// [`EnvelopeError::EmptyName`] / [`EnvelopeError::EmptyId`] for invalid metadata.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self, EnvelopeError> {
        let wire: WireEnvelope =
            serde_json::from_slice(bytes).map_err(|e| EnvelopeError::Decode(e.to_string()))?;
        Self::try_from(wire)
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Envelope {{ name: {}, id: {}, correlation: {} }}",
            self.name(),
            self.id(),
            self.correlation_id()
        )
    }
}

/// Builder for [`Envelope`].
///
/// `id` and `name` are required. A missing correlation id defaults to the
/// message's own id, which is how a causal chain starts.
#[derive(Debug, Default, Clone)]
pub struct EnvelopeBuilder {
    id: Option<String>,
    name: Option<String>,
    correlation_id: Option<String>,
    causation_id: Option<String>,
    stream_id: Option<String>,
    user_context: Option<UserContext>,
    created_at: Option<DateTime<Utc>>,
    payload: Option<Value>,
}

impl EnvelopeBuilder {
    /// Set the message identifier.
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the logical message name.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the correlation identifier.
    #[must_use]
    pub fn correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the causation identifier.
    #[must_use]
    pub fn causation_id(mut self, causation_id: impl Into<String>) -> Self {
        self.causation_id = Some(causation_id.into());
        self
    }

    /// Set (or clear) the stream identifier.
    #[must_use]
    pub fn stream_id(mut self, stream_id: Option<String>) -> Self {
        self.stream_id = stream_id;
        self
    }

    /// Set (or clear) the acting user context.
    #[must_use]
    pub fn user_context(mut self, user_context: Option<UserContext>) -> Self {
        self.user_context = user_context;
        self
    }

    /// Set the creation timestamp. Defaults to now.
    #[must_use]
    pub const fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Set the payload. Defaults to an empty object.
    #[must_use]
    pub fn payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Build the envelope.
    ///
    /// # Errors
    ///
    /// Returns [`EnvelopeError::EmptyId`] or [`EnvelopeError::EmptyName`] when
    /// the required fields are missing or blank.
    pub fn build(self) -> Result<Envelope, EnvelopeError> {
        let id = self
            .id
            .filter(|id| !id.trim().is_empty())
            .ok_or(EnvelopeError::EmptyId)?;
        let name = self
            .name
            .filter(|name| !name.trim().is_empty())
            .ok_or(EnvelopeError::EmptyName)?;
        let correlation_id = self
            .correlation_id
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| id.clone());

        Ok(Envelope {
            metadata: Metadata {
                id,
                name,
                correlation_id,
                causation_id: self.causation_id,
                stream_id: self.stream_id,
                user_context: self.user_context,
                created_at: self.created_at.unwrap_or_else(Utc::now),
            },
            payload: self
                .payload
                .unwrap_or_else(|| Value::Object(serde_json::Map::new())),
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireMetadata {
    id: String,
    name: String,
    #[serde(default)]
    correlation_id: Option<String>,
    #[serde(default)]
    causation_id: Option<String>,
    #[serde(default)]
    stream_id: Option<String>,
    #[serde(default)]
    user_context: Option<UserContext>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct WireEnvelope {
    metadata: WireMetadata,
    #[serde(default)]
    payload: Value,
}

impl TryFrom<WireEnvelope> for Envelope {
    type Error = EnvelopeError;

    fn try_from(wire: WireEnvelope) -> Result<Self, Self::Error> {
        let meta = wire.metadata;
        let mut builder = Envelope::builder()
            .id(meta.id)
            .name(meta.name)
            .stream_id(meta.stream_id)
            .user_context(meta.user_context)
            // Missing timestamps decode to the epoch, never to "now": every
            // redelivery of the record must yield the same envelope.
            .created_at(meta.created_at.unwrap_or_default())
            .payload(wire.payload);
        if let Some(correlation_id) = meta.correlation_id {
            builder = builder.correlation_id(correlation_id);
        }
        if let Some(causation_id) = meta.causation_id {
            builder = builder.causation_id(causation_id);
        }
        builder.build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Envelope {
        Envelope::builder()
            .id("m1")
            .name("progression.event.hearing-resulted")
            .correlation_id("c1")
            .causation_id("m0")
            .stream_id(Some("hearing-1".to_string()))
            .user_context(Some(UserContext::user("u-7")))
            .payload(json!({ "hearingId": "hearing-1" }))
            .build()
            .unwrap()
    }

    #[test]
    fn empty_name_is_rejected() {
        let result = Envelope::builder().id("m1").name("  ").build();
        assert_eq!(result, Err(EnvelopeError::EmptyName));
    }

    #[test]
    fn empty_id_is_rejected() {
        let result = Envelope::builder().name("x").build();
        assert_eq!(result, Err(EnvelopeError::EmptyId));
    }

    #[test]
    fn correlation_defaults_to_own_id() {
        let envelope = Envelope::builder().id("m9").name("x").build().unwrap();
        assert_eq!(envelope.correlation_id(), "m9");
        assert_eq!(envelope.payload(), &json!({}));
    }

    #[test]
    fn wire_format_uses_camel_case_metadata() {
        let bytes = sample().to_json_bytes().unwrap();
        let raw: Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(raw["metadata"]["correlationId"], "c1");
        assert_eq!(raw["metadata"]["causationId"], "m0");
        assert_eq!(raw["metadata"]["streamId"], "hearing-1");
        assert_eq!(raw["metadata"]["userContext"]["userId"], "u-7");
        assert_eq!(raw["payload"]["hearingId"], "hearing-1");
    }

    #[test]
    fn decoding_revalidates_metadata() {
        let bytes = br#"{"metadata":{"id":"m1","name":""},"payload":{}}"#;
        assert_eq!(
            Envelope::from_json_bytes(bytes),
            Err(EnvelopeError::EmptyName)
        );
    }

    #[test]
    fn decoding_without_correlation_starts_a_chain() {
        let bytes = br#"{"metadata":{"id":"m1","name":"x","createdAt":"2025-01-01T00:00:00Z"}}"#;
        let envelope = Envelope::from_json_bytes(bytes).unwrap();
        assert_eq!(envelope.correlation_id(), "m1");
        assert_eq!(envelope.payload(), &Value::Null);
    }

    #[test]
    fn missing_created_at_decodes_the_same_every_time() {
        let bytes = br#"{"metadata":{"id":"m1","name":"x"},"payload":{}}"#;
        let first = Envelope::from_json_bytes(bytes).unwrap();
        let second = Envelope::from_json_bytes(bytes).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.created_at(), DateTime::<Utc>::default());
    }

    #[test]
    fn payload_as_reports_the_message_name() {
        #[derive(Debug, Deserialize)]
        #[allow(dead_code)]
        struct Expected {
            case_id: String,
        }

        let err = sample().payload_as::<Expected>().unwrap_err();
        assert_eq!(err.name, "progression.event.hearing-resulted");
        assert!(err.reason.contains("case_id"));
    }
}
