//! Enrichment protocol: synchronous reads against other bounded contexts.
//!
//! A Handler asks an [`EnrichmentClient`] questions such as "does this case
//! exist" or "resolve this reference code". The answer is an
//! [`EnrichmentResult`], where a missing entity is an ordinary
//! [`EnrichmentResult::NotFound`] value rather than an error. Only
//! communication failures are errors ([`EnrichmentError`]).
//!
//! # Example
//!
//! ```rust,ignore
//! let query = EnrichmentQuery::new("progression.query.case", json!({ "caseId": "c-1" }));
//!
//! match client.lookup(&query, &envelope).await? {
//!     EnrichmentResult::Found(case) => { /* use it */ }
//!     EnrichmentResult::NotFound => return Ok(()), // nothing to do
//! }
//! ```

use crate::envelope::{Envelope, PayloadError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

/// Failure to obtain an answer from another bounded context.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentError {
    /// The remote context could not be reached or answered with a failure.
    #[error("Enrichment query '{query}' failed: {reason}")]
    Transport {
        /// Query name
        query: String,
        /// Failure description
        reason: String,
    },

    /// The remote context did not answer in time.
    #[error("Enrichment query '{query}' timed out")]
    Timeout {
        /// Query name
        query: String,
    },

    /// The remote context answered with a document that is not JSON.
    #[error("Enrichment query '{query}' returned an unreadable document: {reason}")]
    Decode {
        /// Query name
        query: String,
        /// Decoder message
        reason: String,
    },
}

impl EnrichmentError {
    /// Whether retrying the same query may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

/// A named query with a JSON parameter document.
///
/// Query shape and result schema are defined per call site.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EnrichmentQuery {
    name: String,
    params: Value,
}

impl EnrichmentQuery {
    /// Create a query.
    #[must_use]
    pub fn new(name: impl Into<String>, params: Value) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Query name, e.g. `"progression.query.case"`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Query parameters.
    #[must_use]
    pub const fn params(&self) -> &Value {
        &self.params
    }

    /// Stable textual key `name:params`, used for logging and test doubles.
    #[must_use]
    pub fn key(&self) -> String {
        format!("{}:{}", self.name, self.params)
    }
}

/// Outcome of a lookup. Absence is a normal outcome.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EnrichmentResult {
    /// The related entity exists; its document is attached.
    Found(Value),
    /// The related entity does not exist.
    NotFound,
}

impl EnrichmentResult {
    /// Whether the related entity was found.
    #[must_use]
    pub const fn is_present(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// The related document, defined only when present.
    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }

    /// Decode the related document into a typed record.
    ///
    /// Returns `Ok(None)` when the entity is absent.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError`] when the document does not have the shape of `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, PayloadError> {
        self.value()
            .map(|value| T::deserialize(value).map_err(|e| PayloadError::new("enrichment", e)))
            .transpose()
    }
}

impl From<Option<Value>> for EnrichmentResult {
    fn from(value: Option<Value>) -> Self {
        value.map_or(Self::NotFound, Self::Found)
    }
}

/// Request/response collaborator answering enrichment queries.
///
/// Implementations must be stateless from the caller's point of view and
/// safe to call from many concurrent dispatches.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so handlers can hold
/// `Arc<dyn EnrichmentClient>`.
pub trait EnrichmentClient: Send + Sync {
    /// Answer `query` on behalf of the inbound `envelope`.
    ///
    /// The envelope is provided so implementations can forward correlation
    /// and user identity to the remote context.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichmentError`] only for communication failures. A missing
    /// entity is `Ok(EnrichmentResult::NotFound)`.
    fn lookup<'a>(
        &'a self,
        query: &'a EnrichmentQuery,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<EnrichmentResult, EnrichmentError>> + Send + 'a>>;
}

/// Enrichment results collected during one dispatch, keyed by step.
///
/// Single-lookup steps store one result under their key; per-element steps
/// store one result per element, in payload order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Enrichments {
    entries: BTreeMap<String, Vec<EnrichmentResult>>,
}

impl Enrichments {
    /// Empty result set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result under `key`.
    pub fn record(&mut self, key: impl Into<String>, result: EnrichmentResult) {
        self.entries.entry(key.into()).or_default().push(result);
    }

    /// First (or only) result recorded under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&EnrichmentResult> {
        self.entries.get(key).and_then(|results| results.first())
    }

    /// The document recorded under `key`, if present.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<&Value> {
        self.get(key).and_then(EnrichmentResult::value)
    }

    /// All results recorded under `key`.
    #[must_use]
    pub fn all(&self, key: &str) -> &[EnrichmentResult] {
        self.entries.get(key).map_or(&[], Vec::as_slice)
    }

    /// Whether a present result was recorded under `key`.
    #[must_use]
    pub fn is_present(&self, key: &str) -> bool {
        self.get(key).is_some_and(EnrichmentResult::is_present)
    }

    /// Total number of results recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether no results were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
