//! Configuration for a translator process.
//!
//! Loads configuration from environment variables with sensible defaults.

use crate::error::ConfigurationError;
use crate::feature::StaticFeatureGate;
use crate::redelivery::RedeliveryPolicy;
use serde::{Deserialize, Serialize};
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

/// Translator process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranslatorConfig {
    /// Broker connection and subscription
    pub broker: BrokerConfig,
    /// Dispatch limits
    pub dispatch: DispatchConfig,
    /// Enrichment query API
    pub enrichment: EnrichmentConfig,
    /// Redelivery and dead-lettering
    pub redelivery: RedeliveryConfig,
    /// Feature flags
    pub features: FeatureConfig,
    /// Metrics endpoint
    pub metrics: MetricsConfig,
}

/// RedPanda/Kafka configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Broker addresses (comma-separated)
    pub brokers: String,
    /// Consumer group
    pub consumer_group: String,
    /// Topics to subscribe to. Empty means "derive from registered names".
    pub topics: Vec<String>,
    /// Where to start without a committed offset: earliest or latest
    pub auto_offset_reset: String,
}

/// Dispatch limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound for one dispatch in milliseconds (default: 30000)
    pub timeout_ms: u64,
    /// Concurrent ordering lanes (default: 8)
    pub lanes: usize,
    /// Enrichment calls allowed per dispatch (default: 32)
    pub max_enrichment_calls: usize,
    /// Processed message ids remembered for duplicate detection (default: 10000)
    pub processed_cache: usize,
}

/// Enrichment query API
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Base URL of the query API
    pub base_url: String,
    /// Per-request timeout in milliseconds (default: 5000)
    pub request_timeout_ms: u64,
}

/// Redelivery and dead-lettering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedeliveryConfig {
    /// Deliveries allowed per message, including the first (default: 5)
    pub max_attempts: u32,
    /// Delay before the first retry in milliseconds (default: 200)
    pub initial_delay_ms: u64,
    /// Maximum retry delay in milliseconds (default: 30000)
    pub max_delay_ms: u64,
    /// Backoff multiplier in tenths (default: 20, i.e. 2.0)
    pub multiplier_tenths: u32,
    /// Dead-letter queue capacity (default: 1000)
    pub dead_letter_capacity: usize,
}

/// Feature flags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureConfig {
    /// Flags forced on
    pub enabled: Vec<String>,
    /// Flags forced off
    pub disabled: Vec<String>,
    /// Value of unlisted flags (default: true)
    pub default_enabled: bool,
}

/// Metrics endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Bind host (default: 0.0.0.0)
    pub host: String,
    /// Bind port (default: 9090)
    pub port: u16,
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key).and_then(|s| s.trim().parse().ok()).unwrap_or(default)
}

fn string(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}

fn list(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Vec<String> {
    lookup(key)
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

impl TranslatorConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            broker: BrokerConfig {
                brokers: string(&lookup, "REDPANDA_BROKERS", "localhost:9092"),
                consumer_group: string(&lookup, "CONSUMER_GROUP", "event-translator"),
                topics: list(&lookup, "TRANSLATOR_TOPICS"),
                auto_offset_reset: string(&lookup, "REDPANDA_AUTO_OFFSET_RESET", "earliest"),
            },
            dispatch: DispatchConfig {
                timeout_ms: parsed(&lookup, "DISPATCH_TIMEOUT_MS", 30_000),
                lanes: parsed(&lookup, "DISPATCH_LANES", 8),
                max_enrichment_calls: parsed(&lookup, "MAX_ENRICHMENT_CALLS", 32),
                processed_cache: parsed(&lookup, "PROCESSED_CACHE_SIZE", 10_000),
            },
            enrichment: EnrichmentConfig {
                base_url: string(&lookup, "QUERY_API_BASE_URL", "http://localhost:8080"),
                request_timeout_ms: parsed(&lookup, "QUERY_API_TIMEOUT_MS", 5_000),
            },
            redelivery: RedeliveryConfig {
                max_attempts: parsed(&lookup, "REDELIVERY_MAX_ATTEMPTS", 5),
                initial_delay_ms: parsed(&lookup, "REDELIVERY_INITIAL_DELAY_MS", 200),
                max_delay_ms: parsed(&lookup, "REDELIVERY_MAX_DELAY_MS", 30_000),
                multiplier_tenths: parsed(&lookup, "REDELIVERY_MULTIPLIER_TENTHS", 20),
                dead_letter_capacity: parsed(&lookup, "DEAD_LETTER_CAPACITY", 1_000),
            },
            features: FeatureConfig {
                enabled: list(&lookup, "TRANSLATOR_FEATURES_ENABLED"),
                disabled: list(&lookup, "TRANSLATOR_FEATURES_DISABLED"),
                default_enabled: parsed(&lookup, "TRANSLATOR_FEATURES_DEFAULT", true),
            },
            metrics: MetricsConfig {
                host: string(&lookup, "METRICS_HOST", "0.0.0.0"),
                port: parsed(&lookup, "METRICS_PORT", 9090),
            },
        }
    }

    /// Reject values the process cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidSetting`] naming the first bad key.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.broker.brokers.trim().is_empty() {
            return Err(invalid("REDPANDA_BROKERS", "must not be empty"));
        }
        if self.dispatch.lanes == 0 {
            return Err(invalid("DISPATCH_LANES", "must be at least 1"));
        }
        if self.dispatch.timeout_ms == 0 {
            return Err(invalid("DISPATCH_TIMEOUT_MS", "must be positive"));
        }
        if !matches!(self.broker.auto_offset_reset.as_str(), "earliest" | "latest") {
            return Err(invalid("REDPANDA_AUTO_OFFSET_RESET", "must be 'earliest' or 'latest'"));
        }
        self.metrics_addr().map(|_| ())
    }

    /// Dispatch timeout.
    #[must_use]
    pub const fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch.timeout_ms)
    }

    /// Enrichment request timeout.
    #[must_use]
    pub const fn enrichment_timeout(&self) -> Duration {
        Duration::from_millis(self.enrichment.request_timeout_ms)
    }

    /// Redelivery policy built from the redelivery settings.
    #[must_use]
    pub fn redelivery_policy(&self) -> RedeliveryPolicy {
        RedeliveryPolicy::builder()
            .max_attempts(self.redelivery.max_attempts)
            .initial_delay(Duration::from_millis(self.redelivery.initial_delay_ms))
            .max_delay(Duration::from_millis(self.redelivery.max_delay_ms))
            .multiplier(f64::from(self.redelivery.multiplier_tenths) / 10.0)
            .build()
    }

    /// Feature gate built from the feature lists.
    #[must_use]
    pub fn feature_gate(&self) -> StaticFeatureGate {
        StaticFeatureGate::from_lists(
            &self.features.enabled,
            &self.features.disabled,
            self.features.default_enabled,
        )
    }

    /// Metrics bind address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidSetting`] if host and port do not
    /// form a socket address.
    pub fn metrics_addr(&self) -> Result<SocketAddr, ConfigurationError> {
        format!("{}:{}", self.metrics.host, self.metrics.port)
            .parse()
            .map_err(|e: std::net::AddrParseError| invalid("METRICS_HOST", e))
    }
}

fn invalid(key: &str, reason: impl std::fmt::Display) -> ConfigurationError {
    ConfigurationError::InvalidSetting {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use event_translator_core::feature::FeatureGate;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> TranslatorConfig {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        TranslatorConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_are_usable() {
        let config = config(&[]);
        assert!(config.validate().is_ok());
        assert_eq!(config.dispatch_timeout(), Duration::from_secs(30));
        assert_eq!(config.dispatch.max_enrichment_calls, 32);
        assert_eq!(config.redelivery_policy().max_attempts(), 5);
        assert!(config.broker.topics.is_empty());
        assert_eq!(config.metrics_addr().unwrap().port(), 9090);
    }

    #[test]
    fn overrides_and_lists_are_read() {
        let config = config(&[
            ("DISPATCH_LANES", "4"),
            ("TRANSLATOR_TOPICS", "progression.event, listing.event ,"),
            ("TRANSLATOR_FEATURES_DISABLED", "ctl-extension"),
            ("TRANSLATOR_FEATURES_DEFAULT", "false"),
            ("TRANSLATOR_FEATURES_ENABLED", "mirror"),
        ]);

        assert_eq!(config.dispatch.lanes, 4);
        assert_eq!(config.broker.topics, vec!["progression.event", "listing.event"]);
        let gate = config.feature_gate();
        assert!(!gate.is_enabled("ctl-extension"));
        assert!(gate.is_enabled("mirror"));
        assert!(!gate.is_enabled("other"));
    }

    #[test]
    fn unparsable_numbers_fall_back_to_defaults() {
        let config = config(&[("DISPATCH_TIMEOUT_MS", "soon")]);
        assert_eq!(config.dispatch.timeout_ms, 30_000);
    }

    #[test]
    fn zero_lanes_are_rejected() {
        let err = config(&[("DISPATCH_LANES", "0")]).validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidSetting { key, .. } if key == "DISPATCH_LANES"));
    }

    #[test]
    fn bad_metrics_host_is_rejected() {
        let err = config(&[("METRICS_HOST", "not a host")]).validate().unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidSetting { key, .. } if key == "METRICS_HOST"));
    }
}
