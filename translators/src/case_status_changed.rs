//! Case status changes, published with the case URN for outside consumers.
//!
//! The private event only carries the case id. Consumers outside progression
//! address cases by URN, so the case is looked up first; a status change for
//! a case the read model has never seen is dropped.

use event_translator_core::envelope::Envelope;
use event_translator_core::publish::OutboundSpec;
use event_translator_core::transform::{TransformContext, TransformError};
use event_translator_runtime::{EnrichmentStep, TranslatorBuilder};
use serde::{Deserialize, Serialize};

/// Inbound event name.
pub const NAME: &str = "progression.event.case-status-changed";

/// Public mirror.
pub const PUBLIC_NAME: &str = "public.progression.case-status-changed";

/// Query resolving a prosecution case by id.
pub const CASE_QUERY: &str = "progression.query.case";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseStatusChanged {
    case_id: String,
    case_status: String,
    #[serde(default)]
    changed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseSummary {
    urn: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PublicCaseStatusChanged {
    case_id: String,
    case_urn: String,
    case_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    changed_at: Option<String>,
}

/// Configure the translator.
#[must_use]
pub fn configure(builder: TranslatorBuilder) -> TranslatorBuilder {
    builder
        .enrich(EnrichmentStep::field("case", CASE_QUERY, "/caseId", "caseId").required())
        .transformer(transform)
}

/// Build the public event from the inbound event and the case summary.
///
/// # Errors
///
/// Returns [`TransformError::MalformedPayload`] if either document does not
/// have the expected shape.
pub fn transform(
    envelope: &Envelope,
    context: &TransformContext<'_>,
) -> Result<Vec<OutboundSpec>, TransformError> {
    let event: CaseStatusChanged = envelope.payload_as()?;
    let Some(case) = context
        .enrichments()
        .get("case")
        .map(|result| result.decode::<CaseSummary>())
        .transpose()?
        .flatten()
    else {
        return Ok(Vec::new());
    };

    let public = PublicCaseStatusChanged {
        case_id: event.case_id,
        case_urn: case.urn,
        case_status: event.case_status,
        changed_at: event.changed_at,
    };
    Ok(vec![OutboundSpec::from_record(PUBLIC_NAME, &public)?])
}
