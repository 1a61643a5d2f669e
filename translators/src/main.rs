//! Event translator service.
//!
//! Consumes private domain events from Redpanda, enriches them through the
//! query API and republishes public events and commands. Configuration is
//! read from the environment (and `.env` when present); see
//! `TranslatorConfig` for the keys.

use event_translator_catalog::{Collaborators, register_all};
use event_translator_core::transport::Transport;
use event_translator_redpanda::RedpandaTransport;
use event_translator_runtime::{
    DeadLetterQueue, EnvelopePublisher, HandlerRegistry, HttpEnrichmentClient, MetricsServer,
    ProcessedMessages, TranslatorConfig, TranslatorConsumer,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting event translator");

    let config = TranslatorConfig::from_env();
    config.validate()?;
    info!(
        brokers = %config.broker.brokers,
        consumer_group = %config.broker.consumer_group,
        query_api = %config.enrichment.base_url,
        lanes = config.dispatch.lanes,
        "Configuration loaded"
    );

    let mut metrics = MetricsServer::new(config.metrics_addr()?);
    metrics.start()?;

    let transport: Arc<dyn Transport> = Arc::new(
        RedpandaTransport::builder()
            .brokers(&config.broker.brokers)
            .consumer_group(&config.broker.consumer_group)
            .auto_offset_reset(&config.broker.auto_offset_reset)
            .build()?,
    );

    let collaborators = Collaborators::new(
        Arc::new(HttpEnrichmentClient::new(
            &config.enrichment.base_url,
            config.enrichment_timeout(),
        )?),
        Arc::new(EnvelopePublisher::new(Arc::clone(&transport))),
        Arc::new(config.feature_gate()),
    )
    .max_enrichment_calls(config.dispatch.max_enrichment_calls);

    let dispatcher = Arc::new(
        register_all(HandlerRegistry::builder(), &collaborators)?
            .dispatch_timeout(config.dispatch_timeout())
            .build(),
    );
    info!(translators = ?dispatcher.names(), "Translators registered");

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

    let consumer = TranslatorConsumer::builder()
        .name("event-translator")
        .topics(config.broker.topics.clone())
        .transport(Arc::clone(&transport))
        .dispatcher(dispatcher)
        .shutdown(shutdown_rx)
        .lanes(config.dispatch.lanes)
        .redelivery(config.redelivery_policy())
        .dead_letters(DeadLetterQueue::new(config.redelivery.dead_letter_capacity))
        .processed(Arc::new(ProcessedMessages::new(config.dispatch.processed_cache)))
        .build()?;
    info!(topics = ?consumer.topics(), "Subscribing");

    let dead_letters = consumer.dead_letters();
    let handle = consumer.spawn();

    shutdown_signal().await;
    info!("Shutting down, draining lanes...");
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(Duration::from_secs(10), handle).await {
        Ok(Ok(())) => info!("Consumer stopped gracefully"),
        Ok(Err(e)) => warn!(error = %e, "Consumer task failed"),
        Err(_) => warn!("Consumer shutdown timed out"),
    }

    if !dead_letters.is_empty() {
        warn!(
            dead_letters = dead_letters.len(),
            "Exiting with dead-lettered messages; they will not be retried"
        );
    }

    info!("Event translator stopped");
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C signal"),
        () = terminate => info!("Received SIGTERM signal"),
    }
}
