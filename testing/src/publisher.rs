//! Publisher that records instead of publishing.

use event_translator_core::envelope::Envelope;
use event_translator_core::publish::{CorrelationContext, OutboundSpec, PublishError, Publisher};
use event_translator_core::transport::TransportError;
use event_translator_runtime::outbound_id_for;
use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Records the envelopes a Handler would publish.
///
/// Envelopes are built exactly as the transport-backed publisher builds them
/// (same deterministic ids, same correlation stamping).
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    state: Mutex<Recorded>,
}

#[derive(Debug, Default)]
struct Recorded {
    published: Vec<Envelope>,
    failing: HashSet<String>,
}

impl RecordingPublisher {
    /// Publisher that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, Recorded> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Refuse every publish of outbound messages named `name`.
    #[must_use]
    pub fn fail_on(self, name: impl Into<String>) -> Self {
        self.state().failing.insert(name.into());
        self
    }

    /// Stop refusing `name`.
    pub fn recover(&self, name: &str) {
        self.state().failing.remove(name);
    }

    /// Envelopes recorded so far, in publish order.
    #[must_use]
    pub fn published(&self) -> Vec<Envelope> {
        self.state().published.clone()
    }

    /// Names recorded so far, in publish order.
    #[must_use]
    pub fn published_names(&self) -> Vec<String> {
        self.state()
            .published
            .iter()
            .map(|e| e.name().to_string())
            .collect()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.state().published.clear();
    }
}

impl Publisher for RecordingPublisher {
    fn publish<'a>(
        &'a self,
        spec: &'a OutboundSpec,
        context: &'a CorrelationContext,
    ) -> Pin<Box<dyn Future<Output = Result<Envelope, PublishError>> + Send + 'a>> {
        Box::pin(async move {
            let envelope = context.envelope_for(spec, outbound_id_for(spec, context))?;

            let mut state = self.state();
            if state.failing.contains(spec.name()) {
                return Err(PublishError::Transport(TransportError::PublishFailed {
                    name: spec.name().to_string(),
                    reason: "recording publisher refused".to_string(),
                }));
            }
            state.published.push(envelope.clone());
            Ok(envelope)
        })
    }
}
