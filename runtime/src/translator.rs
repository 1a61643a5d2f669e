//! Generic translator: the one Handler every event translator is an instance of.
//!
//! A [`Translator`] is configured, not subclassed. Per inbound event name it
//! composes:
//!
//! 1. an optional feature gate, evaluated fresh on every dispatch
//! 2. enrichment steps, each a query derived from the inbound envelope
//! 3. a [`Transformer`] producing the ordered outbound list
//! 4. a [`Publisher`] emitting each outbound spec in order
//!
//! ```text
//! envelope ──► gate? ──► plan queries ──► lookups ──► transform ──► publish (in order)
//!                │                          │
//!                └─ disabled: success       └─ required & NotFound: success, no output
//! ```
//!
//! Queries are planned from the envelope alone before any lookup runs, so
//! the number of calls is known up front and bounded by
//! [`TranslatorBuilder::max_enrichment_calls`].
//!
//! # Example
//!
//! ```ignore
//! let translator = Translator::builder("X-changed")
//!     .enrich(
//!         EnrichmentStep::field("entity", "entity.query.by-id", "/entityId", "entityId").required(),
//!     )
//!     .enrichment_client(client)
//!     .transformer(MirrorPublicly)
//!     .publisher(publisher)
//!     .build()?;
//! ```

use crate::error::ConfigurationError;
use event_translator_core::enrichment::{
    EnrichmentClient, EnrichmentError, EnrichmentQuery, EnrichmentResult, Enrichments,
};
use event_translator_core::envelope::{Envelope, PayloadError};
use event_translator_core::feature::{AllFeaturesEnabled, FeatureGate};
use event_translator_core::handler::{Handler, HandlerError};
use event_translator_core::publish::{CorrelationContext, Publisher};
use event_translator_core::transform::{TransformContext, Transformer};
use futures::future::join_all;
use serde_json::{Map, Value};
use std::future::Future;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;

/// Default per-dispatch enrichment budget.
pub const DEFAULT_MAX_ENRICHMENT_CALLS: usize = 32;

type PlanOne = dyn Fn(&Envelope) -> Result<Option<EnrichmentQuery>, PayloadError> + Send + Sync;
type PlanMany = dyn Fn(&Envelope) -> Result<Vec<EnrichmentQuery>, PayloadError> + Send + Sync;

enum Plan {
    One(Box<PlanOne>),
    Each(Box<PlanMany>),
}

/// How a translator issues its planned lookups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EnrichmentMode {
    /// One at a time, in step order. A required miss stops further calls.
    #[default]
    Sequential,
    /// All at once. Only valid because queries never depend on each other.
    Concurrent,
}

/// One enrichment step: how to derive its queries and where to store results.
///
/// Results are recorded in [`Enrichments`] under the step's key, one per
/// query, in plan order.
pub struct EnrichmentStep {
    key: String,
    plan: Plan,
    required: bool,
    client: Option<Arc<dyn EnrichmentClient>>,
}

impl EnrichmentStep {
    /// A single lookup derived from the envelope.
    ///
    /// The planner returns `Ok(None)` when this envelope needs no lookup.
    pub fn lookup<F>(key: impl Into<String>, planner: F) -> Self
    where
        F: Fn(&Envelope) -> Result<Option<EnrichmentQuery>, PayloadError> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            plan: Plan::One(Box::new(planner)),
            required: false,
            client: None,
        }
    }

    /// One lookup per element of a payload collection.
    pub fn each<F>(key: impl Into<String>, planner: F) -> Self
    where
        F: Fn(&Envelope) -> Result<Vec<EnrichmentQuery>, PayloadError> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            plan: Plan::Each(Box::new(planner)),
            required: false,
            client: None,
        }
    }

    /// Look up `query` with `{ param: payload[pointer] }`.
    ///
    /// An absent or null source field plans no lookup. For a
    /// [`required`](Self::required) step that means the entity is missing.
    pub fn field(
        key: impl Into<String>,
        query: impl Into<String>,
        pointer: impl Into<String>,
        param: impl Into<String>,
    ) -> Self {
        let query = query.into();
        let pointer = pointer.into();
        let param = param.into();
        Self::lookup(key, move |envelope| {
            Ok(envelope
                .payload()
                .pointer(&pointer)
                .filter(|v| !v.is_null())
                .map(|value| EnrichmentQuery::new(query.clone(), single_param(&param, value.clone()))))
        })
    }

    /// Look up `query` once per element of the array at `array_pointer`,
    /// passing `{ param: element[element_pointer] }`.
    ///
    /// A missing array plans nothing; an element without the field is a
    /// malformed payload.
    pub fn each_field(
        key: impl Into<String>,
        query: impl Into<String>,
        array_pointer: impl Into<String>,
        element_pointer: impl Into<String>,
        param: impl Into<String>,
    ) -> Self {
        let query = query.into();
        let array_pointer = array_pointer.into();
        let element_pointer = element_pointer.into();
        let param = param.into();
        Self::each(key, move |envelope| {
            let Some(items) = envelope.payload().pointer(&array_pointer) else {
                return Ok(Vec::new());
            };
            let items = items.as_array().ok_or_else(|| {
                PayloadError::new(envelope.name(), format!("'{array_pointer}' is not an array"))
            })?;
            items
                .iter()
                .map(|item| -> Result<EnrichmentQuery, PayloadError> {
                    let value = item
                        .pointer(&element_pointer)
                        .filter(|v| !v.is_null())
                        .ok_or_else(|| {
                            PayloadError::new(
                                envelope.name(),
                                format!("element of '{array_pointer}' lacks '{element_pointer}'"),
                            )
                        })?;
                    Ok(EnrichmentQuery::new(query.clone(), single_param(&param, value.clone())))
                })
                .collect()
        })
    }

    /// A `NotFound` answer ends the dispatch successfully with no output.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Use a dedicated client for this step instead of the translator's.
    #[must_use]
    pub fn via(mut self, client: Arc<dyn EnrichmentClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Key results are stored under.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether a miss short-circuits the dispatch.
    #[must_use]
    pub const fn is_required(&self) -> bool {
        self.required
    }

    fn plan(&self, envelope: &Envelope) -> Result<Vec<EnrichmentQuery>, PayloadError> {
        match &self.plan {
            Plan::One(planner) => planner(envelope).map(|q| q.into_iter().collect()),
            Plan::Each(planner) => planner(envelope),
        }
    }
}

impl std::fmt::Debug for EnrichmentStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnrichmentStep")
            .field("key", &self.key)
            .field("required", &self.required)
            .finish_non_exhaustive()
    }
}

fn single_param(param: &str, value: Value) -> Value {
    let mut params = Map::new();
    params.insert(param.to_string(), value);
    Value::Object(params)
}

/// What a dispatch did, for callers that need more than success.
#[derive(Debug, Clone, PartialEq)]
pub enum Translation {
    /// The Transformer ran; these envelopes were published, in order.
    Published(Vec<Envelope>),
    /// The translator's feature flag was disabled.
    Disabled {
        /// Flag that was off
        flag: String,
    },
    /// A required related entity was absent.
    MissingEntity {
        /// Step whose lookup came back empty
        step: String,
    },
}

impl Translation {
    /// Envelopes published by this dispatch.
    #[must_use]
    pub fn published(&self) -> &[Envelope] {
        match self {
            Self::Published(envelopes) => envelopes,
            Self::Disabled { .. } | Self::MissingEntity { .. } => &[],
        }
    }
}

/// Generic Handler composed from enrichment steps, a Transformer and a Publisher.
pub struct Translator {
    name: String,
    gate: Option<String>,
    steps: Vec<EnrichmentStep>,
    mode: EnrichmentMode,
    max_enrichment_calls: usize,
    client: Option<Arc<dyn EnrichmentClient>>,
    transformer: Arc<dyn Transformer>,
    publisher: Arc<dyn Publisher>,
    features: Arc<dyn FeatureGate>,
}

impl Translator {
    /// Start configuring a translator for inbound messages named `name`.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TranslatorBuilder {
        TranslatorBuilder {
            name: name.into(),
            gate: None,
            steps: Vec::new(),
            mode: EnrichmentMode::default(),
            max_enrichment_calls: DEFAULT_MAX_ENRICHMENT_CALLS,
            client: None,
            transformer: None,
            publisher: None,
            features: None,
        }
    }

    /// Inbound name this translator handles.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Translate one envelope and report what happened.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerError`] when planning, an enrichment call, the
    /// Transformer, or a publish fails.
    pub async fn translate(&self, envelope: &Envelope) -> Result<Translation, HandlerError> {
        if let Some(flag) = &self.gate {
            if !self.features.is_enabled(flag) {
                tracing::debug!(flag = %flag, "Feature disabled, nothing to publish");
                return Ok(Translation::Disabled { flag: flag.clone() });
            }
        }

        let mut enrichments = Enrichments::new();
        if let Some(step) = self.enrich(envelope, &mut enrichments).await? {
            tracing::debug!(step = %step, "Required entity not found, nothing to publish");
            return Ok(Translation::MissingEntity { step });
        }

        let context = TransformContext::new(&enrichments, self.features.as_ref());
        let specs = self.transformer.transform(envelope, &context)?;

        let correlation = CorrelationContext::from_inbound(envelope);
        let mut occurrences: HashMap<(&str, Option<&str>), usize> = HashMap::new();
        let mut published = Vec::with_capacity(specs.len());
        for spec in &specs {
            let seen = occurrences
                .entry((spec.name(), correlation.target_stream(spec)))
                .or_default();
            let context = correlation.nth(*seen);
            *seen += 1;
            published.push(self.publisher.publish(spec, &context).await?);
        }
        tracing::debug!(published = published.len(), "Translation complete");
        Ok(Translation::Published(published))
    }

    /// Run all enrichment steps. Returns the key of a required step that
    /// came back empty, if any.
    ///
    /// A required single lookup whose key field is absent counts as empty
    /// without calling the query API.
    async fn enrich(
        &self,
        envelope: &Envelope,
        enrichments: &mut Enrichments,
    ) -> Result<Option<String>, HandlerError> {
        let mut planned = Vec::new();
        for step in &self.steps {
            let queries = step.plan(envelope)?;
            if queries.is_empty() && step.required && matches!(step.plan, Plan::One(_)) {
                return Ok(Some(step.key.clone()));
            }
            planned.extend(queries.into_iter().map(|query| (step, query)));
        }
        if planned.len() > self.max_enrichment_calls {
            return Err(HandlerError::EnrichmentBudgetExceeded {
                requested: planned.len(),
                limit: self.max_enrichment_calls,
            });
        }

        match self.mode {
            EnrichmentMode::Sequential => {
                for (step, query) in &planned {
                    let result = self.lookup(step, query, envelope).await?;
                    let missing = step.required && !result.is_present();
                    enrichments.record(step.key.clone(), result);
                    if missing {
                        return Ok(Some(step.key.clone()));
                    }
                }
            }
            EnrichmentMode::Concurrent => {
                let results = join_all(
                    planned
                        .iter()
                        .map(|(step, query)| self.lookup(step, query, envelope)),
                )
                .await;
                let mut missing = None;
                for ((step, _), result) in planned.iter().zip(results) {
                    let result = result?;
                    if missing.is_none() && step.required && !result.is_present() {
                        missing = Some(step.key.clone());
                    }
                    enrichments.record(step.key.clone(), result);
                }
                if missing.is_some() {
                    return Ok(missing);
                }
            }
        }
        Ok(None)
    }

    async fn lookup(
        &self,
        step: &EnrichmentStep,
        query: &EnrichmentQuery,
        envelope: &Envelope,
    ) -> Result<EnrichmentResult, HandlerError> {
        let Some(client) = step.client.as_ref().or(self.client.as_ref()) else {
            return Err(HandlerError::from(EnrichmentError::Transport {
                query: query.name().to_string(),
                reason: "no enrichment client configured".to_string(),
            }));
        };
        metrics::counter!("translator_enrichment_lookups_total", "query" => query.name().to_string())
            .increment(1);
        let result = client.lookup(query, envelope).await?;
        if !result.is_present() {
            tracing::debug!(query = %query.key(), "Enrichment not found");
            metrics::counter!("translator_enrichment_not_found_total", "query" => query.name().to_string())
                .increment(1);
        }
        Ok(result)
    }
}

impl Handler for Translator {
    fn handle<'a>(
        &'a self,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send + 'a>> {
        Box::pin(async move { self.translate(envelope).await.map(|_| ()) })
    }
}

impl std::fmt::Debug for Translator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Translator")
            .field("name", &self.name)
            .field("gate", &self.gate)
            .field("steps", &self.steps)
            .field("mode", &self.mode)
            .field("max_enrichment_calls", &self.max_enrichment_calls)
            .finish_non_exhaustive()
    }
}

/// Builder for [`Translator`].
#[must_use]
pub struct TranslatorBuilder {
    name: String,
    gate: Option<String>,
    steps: Vec<EnrichmentStep>,
    mode: EnrichmentMode,
    max_enrichment_calls: usize,
    client: Option<Arc<dyn EnrichmentClient>>,
    transformer: Option<Arc<dyn Transformer>>,
    publisher: Option<Arc<dyn Publisher>>,
    features: Option<Arc<dyn FeatureGate>>,
}

impl TranslatorBuilder {
    /// Only translate while `flag` is enabled.
    pub fn gated_by(mut self, flag: impl Into<String>) -> Self {
        self.gate = Some(flag.into());
        self
    }

    /// Append an enrichment step.
    pub fn enrich(mut self, step: EnrichmentStep) -> Self {
        self.steps.push(step);
        self
    }

    /// How planned lookups are issued (default sequential).
    pub const fn enrichment_mode(mut self, mode: EnrichmentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Per-dispatch limit on planned lookups (default 32).
    pub const fn max_enrichment_calls(mut self, limit: usize) -> Self {
        self.max_enrichment_calls = limit;
        self
    }

    /// Client used by steps without their own.
    pub fn enrichment_client(mut self, client: Arc<dyn EnrichmentClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the Transformer.
    pub fn transformer(mut self, transformer: impl Transformer + 'static) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    /// Set the Publisher.
    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Set the feature gate (default: everything enabled).
    pub fn features(mut self, features: Arc<dyn FeatureGate>) -> Self {
        self.features = Some(features);
        self
    }

    /// Build the translator.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError`] if the Transformer or Publisher is
    /// missing, or if a step has no enrichment client to run on.
    pub fn build(self) -> Result<Translator, ConfigurationError> {
        let transformer = self
            .transformer
            .ok_or_else(|| ConfigurationError::MissingTransformer(self.name.clone()))?;
        let publisher = self
            .publisher
            .ok_or_else(|| ConfigurationError::MissingPublisher(self.name.clone()))?;
        if self.client.is_none() && self.steps.iter().any(|step| step.client.is_none()) {
            return Err(ConfigurationError::MissingEnrichmentClient(self.name));
        }

        Ok(Translator {
            name: self.name,
            gate: self.gate,
            steps: self.steps,
            mode: self.mode,
            max_enrichment_calls: self.max_enrichment_calls,
            client: self.client,
            transformer,
            publisher,
            features: self.features.unwrap_or_else(|| Arc::new(AllFeaturesEnabled)),
        })
    }
}
