//! Handler seam and its error type.
//!
//! A [`Handler`] processes one inbound envelope end to end: enrichment,
//! feature gate, transformation and publishing. The runtime crate provides
//! the generic implementation (`Translator`); this trait is what the
//! dispatcher's registry stores.

use crate::enrichment::EnrichmentError;
use crate::envelope::{Envelope, PayloadError};
use crate::publish::PublishError;
use crate::transform::TransformError;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Failure to process one inbound message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// An enrichment call could not be answered.
    #[error(transparent)]
    Enrichment(#[from] EnrichmentError),

    /// A derivative message could not be published.
    #[error(transparent)]
    Publish(#[from] PublishError),

    /// The inbound payload could not be interpreted.
    #[error(transparent)]
    MalformedPayload(#[from] PayloadError),

    /// The Transformer refused the message.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The enrichment plan for this message asks for more calls than allowed.
    #[error("Enrichment plan needs {requested} calls, limit is {limit}")]
    EnrichmentBudgetExceeded {
        /// Calls the plan would issue
        requested: usize,
        /// Per-dispatch limit
        limit: usize,
    },
}

impl HandlerError {
    /// Whether re-dispatching the same envelope may succeed.
    ///
    /// Communication failures are transient; malformed payloads and budget
    /// violations fail the same way every time.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Enrichment(e) => e.is_transient(),
            Self::Publish(e) => e.is_transient(),
            Self::MalformedPayload(_) | Self::Transform(_) | Self::EnrichmentBudgetExceeded { .. } => {
                false
            }
        }
    }
}

/// Processes inbound envelopes of one registered name.
///
/// Implementations receive their collaborators (enrichment clients,
/// publisher, feature gate) at construction time and must be idempotent
/// under redelivery of the same envelope.
pub trait Handler: Send + Sync {
    /// Handle one envelope.
    ///
    /// Must not return `Ok` while any publish is still in flight.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] if processing failed; the transport may
    /// redeliver the envelope.
    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;

    #[test]
    fn retryability_follows_the_cause() {
        let timeout = HandlerError::from(EnrichmentError::Timeout {
            query: "q".to_string(),
        });
        let refused = HandlerError::from(PublishError::Transport(TransportError::Other(
            "broker down".to_string(),
        )));
        let malformed = HandlerError::from(PayloadError::new("x", "missing field"));
        let budget = HandlerError::EnrichmentBudgetExceeded {
            requested: 40,
            limit: 32,
        };

        assert!(timeout.is_retryable());
        assert!(refused.is_retryable());
        assert!(!malformed.is_retryable());
        assert!(!budget.is_retryable());
    }
}
