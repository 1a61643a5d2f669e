//! Scripted enrichment client.

use event_translator_core::enrichment::{
    EnrichmentClient, EnrichmentError, EnrichmentQuery, EnrichmentResult,
};
use event_translator_core::envelope::Envelope;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Enrichment client answering from a script.
///
/// Lookup order: injected failures for the query name, then an answer for
/// the exact query (name and parameters), then an answer for the query name.
/// Anything unscripted is [`EnrichmentResult::NotFound`].
///
/// # Example
///
/// ```
/// use event_translator_testing::ScriptedEnrichmentClient;
/// use event_translator_core::enrichment::EnrichmentQuery;
/// use serde_json::json;
///
/// let client = ScriptedEnrichmentClient::new()
///     .found(EnrichmentQuery::new("q.case", json!({ "caseId": "c1" })), json!({ "urn": "U1" }))
///     .fail("q.hearing", 2);
/// assert_eq!(client.call_count(), 0);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedEnrichmentClient {
    script: Mutex<Script>,
}

#[derive(Debug, Default)]
struct Script {
    by_query: HashMap<String, EnrichmentResult>,
    by_name: HashMap<String, EnrichmentResult>,
    failures: HashMap<String, usize>,
    calls: Vec<EnrichmentQuery>,
}

impl ScriptedEnrichmentClient {
    /// Client where every query is not found.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn script_mut(&mut self) -> &mut Script {
        self.script.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer `query` with `document`.
    #[must_use]
    pub fn found(mut self, query: EnrichmentQuery, document: Value) -> Self {
        self.script_mut()
            .by_query
            .insert(query.key(), EnrichmentResult::Found(document));
        self
    }

    /// Answer every query named `name` with `document`.
    #[must_use]
    pub fn found_for_name(mut self, name: impl Into<String>, document: Value) -> Self {
        self.script_mut()
            .by_name
            .insert(name.into(), EnrichmentResult::Found(document));
        self
    }

    /// Answer `query` with not-found, overriding a name-level answer.
    #[must_use]
    pub fn not_found(mut self, query: EnrichmentQuery) -> Self {
        self.script_mut()
            .by_query
            .insert(query.key(), EnrichmentResult::NotFound);
        self
    }

    /// Fail the next `times` queries named `name` with a transport error.
    #[must_use]
    pub fn fail(mut self, name: impl Into<String>, times: usize) -> Self {
        self.script_mut().failures.insert(name.into(), times);
        self
    }

    /// Every query received, in call order.
    #[must_use]
    pub fn calls(&self) -> Vec<EnrichmentQuery> {
        self.script().calls.clone()
    }

    /// Number of queries received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.script().calls.len()
    }

    fn answer(&self, query: &EnrichmentQuery) -> Result<EnrichmentResult, EnrichmentError> {
        let mut script = self.script();
        script.calls.push(query.clone());

        if let Some(remaining) = script.failures.get_mut(query.name()) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(EnrichmentError::Transport {
                    query: query.name().to_string(),
                    reason: "scripted failure".to_string(),
                });
            }
        }

        Ok(script
            .by_query
            .get(&query.key())
            .or_else(|| script.by_name.get(query.name()))
            .cloned()
            .unwrap_or(EnrichmentResult::NotFound))
    }
}

impl EnrichmentClient for ScriptedEnrichmentClient {
    fn lookup<'a>(
        &'a self,
        query: &'a EnrichmentQuery,
        _envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<EnrichmentResult, EnrichmentError>> + Send + 'a>> {
        let answer = self.answer(query);
        Box::pin(async move { answer })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn envelope() -> Envelope {
        Envelope::builder().id("m1").name("X-changed").build().unwrap()
    }

    #[tokio::test]
    async fn exact_answer_beats_name_answer() {
        let exact = EnrichmentQuery::new("q", json!({ "id": 1 }));
        let other = EnrichmentQuery::new("q", json!({ "id": 2 }));
        let client = ScriptedEnrichmentClient::new()
            .found_for_name("q", json!("any"))
            .found(exact.clone(), json!("one"));

        let envelope = envelope();
        assert_eq!(
            client.lookup(&exact, &envelope).await.unwrap(),
            EnrichmentResult::Found(json!("one"))
        );
        assert_eq!(
            client.lookup(&other, &envelope).await.unwrap(),
            EnrichmentResult::Found(json!("any"))
        );
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn failures_run_out() {
        let query = EnrichmentQuery::new("q", json!({}));
        let client = ScriptedEnrichmentClient::new().fail("q", 1);
        let envelope = envelope();

        assert!(client.lookup(&query, &envelope).await.is_err());
        assert_eq!(
            client.lookup(&query, &envelope).await.unwrap(),
            EnrichmentResult::NotFound
        );
    }
}
