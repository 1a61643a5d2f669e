//! Prometheus metrics for the translator pipeline.
//!
//! Dispatch, enrichment, publishing, redelivery and dead-lettering record
//! through the `metrics` facade. [`MetricsServer`] installs the Prometheus
//! recorder and serves the scrape endpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use event_translator_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//!
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use thiserror::Error;

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics recorder
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Exposes metrics on an HTTP endpoint for Prometheus scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and spawn the HTTP exporter.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Build`] if the exporter cannot be built or its
    /// listener cannot bind.
    ///
    /// # Note
    ///
    /// If a recorder is already installed (e.g. in tests), the call logs a
    /// warning, leaves the existing recorder in place and returns `Ok`.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        if metrics::set_global_recorder(recorder).is_err() {
            tracing::warn!("Metrics recorder already initialized, skipping re-initialization");
            return Ok(());
        }

        tokio::spawn(async move {
            if let Err(e) = exporter.await {
                tracing::error!(error = ?e, "Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(
            addr = %self.addr,
            "Metrics server started - available at http://{}/metrics",
            self.addr
        );
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    // Dispatch
    describe_counter!(
        "translator_dispatch_total",
        "Inbound messages dispatched, by outcome (handled, ignored, failed)"
    );
    describe_histogram!(
        "translator_dispatch_duration_seconds",
        "Time taken to handle one inbound message"
    );
    describe_counter!(
        "translator_duplicates_skipped_total",
        "Redelivered messages skipped because they were already processed"
    );

    // Enrichment
    describe_counter!(
        "translator_enrichment_lookups_total",
        "Enrichment queries issued"
    );
    describe_counter!(
        "translator_enrichment_not_found_total",
        "Enrichment queries answered with not-found"
    );

    // Publishing
    describe_counter!(
        "translator_published_total",
        "Outbound messages published, by name"
    );
    describe_counter!(
        "translator_publish_errors_total",
        "Outbound publishes refused by the transport"
    );

    // Failure handling
    describe_counter!(
        "translator_redeliveries_total",
        "Dispatch attempts repeated after a retryable failure"
    );
    describe_counter!(
        "translator_dead_letters_total",
        "Inbound messages parked in the dead-letter queue"
    );
    describe_counter!(
        "translator_dead_letters_dropped_total",
        "Dead-letter entries dropped because the queue was full"
    );
    describe_gauge!(
        "translator_dead_letter_queue_size",
        "Current dead-letter queue size"
    );
}
