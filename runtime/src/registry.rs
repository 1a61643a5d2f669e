//! Handler registry and dispatcher.
//!
//! The registry maps an inbound message name to exactly one [`Handler`]. It
//! is assembled once at startup, where duplicate names are rejected, and is
//! read-only afterwards.
//!
//! # Example
//!
//! ```ignore
//! let dispatcher = HandlerRegistry::builder()
//!     .dispatch_timeout(Duration::from_secs(10))
//!     .register_translator(entity_changed)?
//!     .register("progression.event.case-closed", Arc::new(CaseClosedHandler::new(deps)))?
//!     .build();
//!
//! match dispatcher.dispatch(&envelope).await {
//!     Ok(DispatchOutcome::Handled) => { /* acknowledge */ }
//!     Ok(DispatchOutcome::Ignored) => { /* nobody listens, acknowledge */ }
//!     Err(e) if e.is_retryable() => { /* redeliver */ }
//!     Err(e) => { /* dead-letter */ }
//! }
//! ```

use crate::error::{ConfigurationError, DispatchError, DispatchFailure};
use crate::translator::Translator;
use event_translator_core::envelope::Envelope;
use event_translator_core::handler::Handler;
use event_translator_core::transport::topic_for;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Default upper bound for one dispatch.
pub const DEFAULT_DISPATCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Successful dispatch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The registered Handler completed.
    Handled,
    /// No Handler is registered for the name; nothing happened.
    Ignored,
}

impl DispatchOutcome {
    /// Metric label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Handled => "handled",
            Self::Ignored => "ignored",
        }
    }
}

/// Entry point for building a [`Dispatcher`].
pub struct HandlerRegistry;

impl HandlerRegistry {
    /// Start registering Handlers.
    #[must_use]
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder {
            handlers: HashMap::new(),
            dispatch_timeout: DEFAULT_DISPATCH_TIMEOUT,
        }
    }
}

/// Collects name → Handler bindings.
pub struct HandlerRegistryBuilder {
    handlers: HashMap<String, Arc<dyn Handler>>,
    dispatch_timeout: Duration,
}

impl HandlerRegistryBuilder {
    /// Bind `handler` to inbound messages named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::DuplicateHandler`] if `name` is already
    /// bound and [`ConfigurationError::EmptyHandlerName`] for a blank name.
    pub fn register(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn Handler>,
    ) -> Result<Self, ConfigurationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ConfigurationError::EmptyHandlerName);
        }
        if self.handlers.contains_key(&name) {
            return Err(ConfigurationError::DuplicateHandler(name));
        }
        self.handlers.insert(name, handler);
        Ok(self)
    }

    /// Bind a translator under the inbound name it was built for.
    ///
    /// # Errors
    ///
    /// Same as [`HandlerRegistryBuilder::register`].
    pub fn register_translator(self, translator: Translator) -> Result<Self, ConfigurationError> {
        let name = translator.name().to_string();
        self.register(name, Arc::new(translator))
    }

    /// Upper bound for a single dispatch (default 30 seconds).
    #[must_use]
    pub const fn dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = timeout;
        self
    }

    /// Freeze the registry.
    #[must_use]
    pub fn build(self) -> Dispatcher {
        tracing::info!(
            handlers = self.handlers.len(),
            timeout_ms = self.dispatch_timeout.as_millis(),
            "Handler registry built"
        );
        Dispatcher {
            handlers: self.handlers,
            timeout: self.dispatch_timeout,
        }
    }
}

/// Routes inbound envelopes to their registered Handler.
///
/// Holds no mutable state; safe to share across concurrent dispatches.
pub struct Dispatcher {
    handlers: HashMap<String, Arc<dyn Handler>>,
    timeout: Duration,
}

impl Dispatcher {
    /// Dispatch one envelope.
    ///
    /// An unregistered name is not an error: the call returns
    /// [`DispatchOutcome::Ignored`] without side effects.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the Handler fails or exceeds the
    /// dispatch timeout.
    pub async fn dispatch(&self, envelope: &Envelope) -> Result<DispatchOutcome, DispatchError> {
        let span = tracing::info_span!(
            "dispatch",
            message_id = %envelope.id(),
            name = %envelope.name(),
            correlation_id = %envelope.correlation_id(),
        );
        self.dispatch_inner(envelope).instrument(span).await
    }

    async fn dispatch_inner(&self, envelope: &Envelope) -> Result<DispatchOutcome, DispatchError> {
        let Some(handler) = self.handlers.get(envelope.name()) else {
            tracing::debug!("No handler registered, ignoring");
            metrics::counter!("translator_dispatch_total", "outcome" => "ignored").increment(1);
            return Ok(DispatchOutcome::Ignored);
        };

        let started = Instant::now();
        let result = match tokio::time::timeout(self.timeout, handler.handle(envelope)).await {
            Ok(Ok(())) => Ok(DispatchOutcome::Handled),
            Ok(Err(e)) => Err(DispatchError::new(envelope, e)),
            Err(_) => Err(DispatchError::new(envelope, DispatchFailure::Timeout(self.timeout))),
        };
        metrics::histogram!("translator_dispatch_duration_seconds")
            .record(started.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                metrics::counter!("translator_dispatch_total", "outcome" => outcome.as_str())
                    .increment(1);
            }
            Err(e) => {
                tracing::debug!(error = %e, retryable = e.is_retryable(), "Dispatch failed");
                metrics::counter!("translator_dispatch_total", "outcome" => "failed").increment(1);
            }
        }
        result
    }

    /// Whether a Handler is bound to `name`.
    #[must_use]
    pub fn is_registered(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Topics carrying at least one registered name.
    #[must_use]
    pub fn topics(&self) -> BTreeSet<&str> {
        self.handlers.keys().map(|name| topic_for(name)).collect()
    }

    /// Configured dispatch timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("handlers", &self.names())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use event_translator_core::envelope::PayloadError;
    use event_translator_core::handler::HandlerError;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl Handler for Counting {
        fn handle<'a>(
            &'a self,
            _envelope: &'a Envelope,
        ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async { Ok(()) })
        }
    }

    struct Malformed;

    impl Handler for Malformed {
        fn handle<'a>(
            &'a self,
            envelope: &'a Envelope,
        ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
            Box::pin(async move {
                Err(HandlerError::from(PayloadError::new(envelope.name(), "missing caseId")))
            })
        }
    }

    struct Slow;

    impl Handler for Slow {
        fn handle<'a>(
            &'a self,
            _envelope: &'a Envelope,
        ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(())
            })
        }
    }

    fn envelope(name: &str) -> Envelope {
        Envelope::builder().id("m1").name(name).build().unwrap()
    }

    #[test]
    fn duplicate_registration_fails_at_startup() {
        let result = HandlerRegistry::builder()
            .register("X-changed", Arc::new(Counting::default()))
            .unwrap()
            .register("X-changed", Arc::new(Counting::default()));

        assert!(matches!(result, Err(ConfigurationError::DuplicateHandler(name)) if name == "X-changed"));
    }

    #[test]
    fn empty_name_is_rejected() {
        let result = HandlerRegistry::builder().register(" ", Arc::new(Counting::default()));
        assert!(matches!(result, Err(ConfigurationError::EmptyHandlerName)));
    }

    #[tokio::test]
    async fn unregistered_names_are_ignored() {
        let handler = Arc::new(Counting::default());
        let dispatcher = HandlerRegistry::builder()
            .register("X-changed", handler.clone())
            .unwrap()
            .build();

        let outcome = dispatcher.dispatch(&envelope("Y-changed")).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Ignored);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn registered_name_reaches_its_handler() {
        let handler = Arc::new(Counting::default());
        let dispatcher = HandlerRegistry::builder()
            .register("X-changed", handler.clone())
            .unwrap()
            .build();

        let outcome = dispatcher.dispatch(&envelope("X-changed")).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Handled);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn handler_failure_carries_identity() {
        let dispatcher = HandlerRegistry::builder()
            .register("X-changed", Arc::new(Malformed))
            .unwrap()
            .build();

        let err = dispatcher.dispatch(&envelope("X-changed")).await.unwrap_err();

        assert_eq!(err.message_id, "m1");
        assert_eq!(err.name, "X-changed");
        assert!(!err.is_retryable());
    }

    #[tokio::test(start_paused = true)]
    async fn slow_handlers_time_out() {
        let dispatcher = HandlerRegistry::builder()
            .dispatch_timeout(Duration::from_millis(50))
            .register("X-changed", Arc::new(Slow))
            .unwrap()
            .build();

        let err = dispatcher.dispatch(&envelope("X-changed")).await.unwrap_err();

        assert_eq!(err.cause, DispatchFailure::Timeout(Duration::from_millis(50)));
        assert!(err.is_retryable());
    }

    #[test]
    fn topics_are_derived_from_names() {
        let dispatcher = HandlerRegistry::builder()
            .register("progression.event.hearing-resulted", Arc::new(Counting::default()))
            .unwrap()
            .register("progression.event.case-status-changed", Arc::new(Counting::default()))
            .unwrap()
            .register("listing.event.hearing-listed", Arc::new(Counting::default()))
            .unwrap()
            .build();

        let topics: Vec<&str> = dispatcher.topics().into_iter().collect();
        assert_eq!(topics, vec!["listing.event", "progression.event"]);
    }
}
