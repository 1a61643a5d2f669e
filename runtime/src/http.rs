//! HTTP enrichment client.
//!
//! Issues `POST {base_url}/queries/{query name}` with the query parameters as
//! the JSON body. The acting user and the correlation id of the inbound
//! envelope travel as `X-User-Id` and `X-Correlation-Id` headers.
//!
//! Status mapping:
//!
//! | Status          | Result                             |
//! |-----------------|------------------------------------|
//! | 404, 204        | `Ok(EnrichmentResult::NotFound)`   |
//! | other 2xx       | `Ok(EnrichmentResult::Found(body))`|
//! | anything else   | `Err(EnrichmentError::Transport)`  |

use event_translator_core::enrichment::{
    EnrichmentClient, EnrichmentError, EnrichmentQuery, EnrichmentResult,
};
use event_translator_core::envelope::Envelope;
use reqwest::StatusCode;
use reqwest::header::CONTENT_TYPE;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Header carrying the acting user.
pub const USER_ID_HEADER: &str = "X-User-Id";
/// Header carrying the correlation id.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-Id";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Enrichment client talking to a query API over HTTP.
#[derive(Debug, Clone)]
pub struct HttpEnrichmentClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpEnrichmentClient {
    /// Client for the query API at `base_url` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichmentError::Transport`] if the HTTP client cannot be
    /// constructed (e.g. TLS backend initialisation fails).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, EnrichmentError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichmentError::Transport {
                query: "<client>".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self::with_client(client, base_url))
    }

    /// Client reusing an existing `reqwest::Client`.
    #[must_use]
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { client, base_url }
    }

    /// URL for `query`.
    #[must_use]
    pub fn url_for(&self, query: &EnrichmentQuery) -> String {
        format!("{}/queries/{}", self.base_url, query.name())
    }

    async fn execute(
        &self,
        query: &EnrichmentQuery,
        envelope: &Envelope,
    ) -> Result<EnrichmentResult, EnrichmentError> {
        let body = serde_json::to_vec(query.params()).map_err(|e| EnrichmentError::Decode {
            query: query.name().to_string(),
            reason: e.to_string(),
        })?;

        let mut request = self
            .client
            .post(self.url_for(query))
            .header(CONTENT_TYPE, "application/json")
            .header(CORRELATION_ID_HEADER, envelope.correlation_id())
            .body(body);
        if let Some(user_id) = envelope.user_context().and_then(|u| u.user_id.as_deref()) {
            request = request.header(USER_ID_HEADER, user_id);
        }

        let response = request.send().await.map_err(|e| transport_failure(query, &e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| transport_failure(query, &e))?;

        classify(query, status, &bytes)
    }
}

fn transport_failure(query: &EnrichmentQuery, error: &reqwest::Error) -> EnrichmentError {
    if error.is_timeout() {
        EnrichmentError::Timeout {
            query: query.name().to_string(),
        }
    } else {
        EnrichmentError::Transport {
            query: query.name().to_string(),
            reason: error.to_string(),
        }
    }
}

/// Map an HTTP answer to an enrichment result.
///
/// # Errors
///
/// [`EnrichmentError::Transport`] for non-success statuses and
/// [`EnrichmentError::Decode`] for a success body that is not JSON.
pub fn classify(
    query: &EnrichmentQuery,
    status: StatusCode,
    body: &[u8],
) -> Result<EnrichmentResult, EnrichmentError> {
    if status == StatusCode::NOT_FOUND || status == StatusCode::NO_CONTENT {
        return Ok(EnrichmentResult::NotFound);
    }
    if !status.is_success() {
        return Err(EnrichmentError::Transport {
            query: query.name().to_string(),
            reason: format!("unexpected status {status}"),
        });
    }
    serde_json::from_slice(body)
        .map(EnrichmentResult::Found)
        .map_err(|e| EnrichmentError::Decode {
            query: query.name().to_string(),
            reason: e.to_string(),
        })
}

impl EnrichmentClient for HttpEnrichmentClient {
    fn lookup<'a>(
        &'a self,
        query: &'a EnrichmentQuery,
        envelope: &'a Envelope,
    ) -> Pin<Box<dyn Future<Output = Result<EnrichmentResult, EnrichmentError>> + Send + 'a>> {
        Box::pin(self.execute(query, envelope))
    }
}
