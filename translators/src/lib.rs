//! # Event Translator Catalog
//!
//! The translator instances this service runs. Each module configures the
//! generic [`Translator`] for one inbound event name: which lookups to make,
//! whether a feature flag guards it, and the Transformer that shapes the
//! outbound messages. None of them contain pipeline logic of their own.
//!
//! | Module | Inbound | Shape |
//! |--------|---------|-------|
//! | [`entity_changed`] | `X-changed` | required lookup, public mirror |
//! | [`case_status_changed`] | `progression.event.case-status-changed` | required lookup, typed records, public mirror |
//! | [`hearing_resulted`] | `progression.event.hearing-resulted` | per-case lookups, one command per found case, mirror last |
//! | [`custody_time_limit_extended`] | `progression.event.custody-time-limit-extended` | feature-gated, command strictly before mirror |
//! | [`offence_code_resolved`] | `progression.event.offence-code-resolved` | optional reference data, payload projection |
//!
//! # Wiring
//!
//! ```ignore
//! let registry = register_all(HandlerRegistry::builder(), &collaborators)?;
//! let dispatcher = registry.dispatch_timeout(config.dispatch_timeout()).build();
//! ```

pub mod case_status_changed;
pub mod custody_time_limit_extended;
pub mod entity_changed;
pub mod hearing_resulted;
pub mod offence_code_resolved;

use event_translator_core::enrichment::EnrichmentClient;
use event_translator_core::feature::FeatureGate;
use event_translator_core::publish::Publisher;
use event_translator_runtime::translator::DEFAULT_MAX_ENRICHMENT_CALLS;
use event_translator_runtime::{ConfigurationError, HandlerRegistryBuilder, Translator, TranslatorBuilder};
use std::sync::Arc;

/// Configures a translator builder for one inbound event.
pub type Configure = fn(TranslatorBuilder) -> TranslatorBuilder;

/// Every translator in this catalog: inbound name and configuration.
#[must_use]
pub fn catalog() -> Vec<(&'static str, Configure)> {
    vec![
        (entity_changed::NAME, entity_changed::configure as Configure),
        (case_status_changed::NAME, case_status_changed::configure),
        (hearing_resulted::NAME, hearing_resulted::configure),
        (
            custody_time_limit_extended::NAME,
            custody_time_limit_extended::configure,
        ),
        (offence_code_resolved::NAME, offence_code_resolved::configure),
    ]
}

/// Shared collaborators handed to every translator.
#[derive(Clone)]
pub struct Collaborators {
    enrichment: Arc<dyn EnrichmentClient>,
    publisher: Arc<dyn Publisher>,
    features: Arc<dyn FeatureGate>,
    max_enrichment_calls: usize,
}

impl Collaborators {
    /// Bundle the collaborators.
    #[must_use]
    pub fn new(
        enrichment: Arc<dyn EnrichmentClient>,
        publisher: Arc<dyn Publisher>,
        features: Arc<dyn FeatureGate>,
    ) -> Self {
        Self {
            enrichment,
            publisher,
            features,
            max_enrichment_calls: DEFAULT_MAX_ENRICHMENT_CALLS,
        }
    }

    /// Per-dispatch enrichment budget applied to every translator.
    #[must_use]
    pub const fn max_enrichment_calls(mut self, limit: usize) -> Self {
        self.max_enrichment_calls = limit;
        self
    }

    /// Build the translator for `name` from `configure`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if the configured translator is
    /// incomplete.
    pub fn translator(&self, name: &str, configure: Configure) -> Result<Translator, ConfigurationError> {
        configure(Translator::builder(name))
            .max_enrichment_calls(self.max_enrichment_calls)
            .enrichment_client(Arc::clone(&self.enrichment))
            .publisher(Arc::clone(&self.publisher))
            .features(Arc::clone(&self.features))
            .build()
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("max_enrichment_calls", &self.max_enrichment_calls)
            .finish_non_exhaustive()
    }
}

/// Register every catalog translator.
///
/// # Errors
///
/// Returns [`ConfigurationError`] if a translator is incomplete or a name is
/// already registered.
pub fn register_all(
    mut registry: HandlerRegistryBuilder,
    collaborators: &Collaborators,
) -> Result<HandlerRegistryBuilder, ConfigurationError> {
    for (name, configure) in catalog() {
        registry = registry.register_translator(collaborators.translator(name, configure)?)?;
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn catalog_names_are_unique() {
        let names: HashSet<_> = catalog().into_iter().map(|(name, _)| name).collect();
        assert_eq!(names.len(), catalog().len());
    }
}
