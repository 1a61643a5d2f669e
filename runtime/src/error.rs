//! Error types for dispatch and startup configuration.

use event_translator_core::envelope::Envelope;
use event_translator_core::handler::HandlerError;
use std::time::Duration;
use thiserror::Error;

/// Why a dispatch failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchFailure {
    /// The Handler reported a failure.
    #[error(transparent)]
    Handler(#[from] HandlerError),

    /// The Handler did not finish within the dispatch timeout.
    #[error("Dispatch timed out after {0:?}")]
    Timeout(Duration),
}

/// A failed dispatch, identified by the inbound message.
///
/// The transport uses [`DispatchError::is_retryable`] to choose between
/// redelivery and the dead-letter path.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Dispatch of '{name}' ({message_id}) failed: {cause}")]
pub struct DispatchError {
    /// Id of the inbound envelope
    pub message_id: String,
    /// Name of the inbound envelope
    pub name: String,
    /// Underlying failure
    #[source]
    pub cause: DispatchFailure,
}

impl DispatchError {
    /// Wrap `cause` with the identity of `envelope`.
    #[must_use]
    pub fn new(envelope: &Envelope, cause: impl Into<DispatchFailure>) -> Self {
        Self {
            message_id: envelope.id().to_string(),
            name: envelope.name().to_string(),
            cause: cause.into(),
        }
    }

    /// Whether redelivering the same envelope may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match &self.cause {
            DispatchFailure::Timeout(_) => true,
            DispatchFailure::Handler(e) => e.is_retryable(),
        }
    }
}

/// Startup wiring errors. Never raised while handling a message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Two Handlers were registered for the same name.
    #[error("A handler is already registered for '{0}'")]
    DuplicateHandler(String),

    /// A Handler was registered under an empty name.
    #[error("Handler name must not be empty")]
    EmptyHandlerName,

    /// A translator was built without a Transformer.
    #[error("Translator '{0}' has no transformer")]
    MissingTransformer(String),

    /// A translator was built without a Publisher.
    #[error("Translator '{0}' has no publisher")]
    MissingPublisher(String),

    /// A translator declares enrichment steps but has no client to run them.
    #[error("Translator '{0}' enriches but has no enrichment client")]
    MissingEnrichmentClient(String),

    /// A required component setting was not provided.
    #[error("Missing required setting: {0}")]
    MissingSetting(&'static str),

    /// A setting had an unusable value.
    #[error("Invalid setting '{key}': {reason}")]
    InvalidSetting {
        /// Setting name
        key: String,
        /// What is wrong with it
        reason: String,
    },
}
