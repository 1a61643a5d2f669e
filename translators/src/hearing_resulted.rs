//! Hearing results fan out to every prosecution case heard.
//!
//! Each case in the hearing is looked up (concurrently, the lookups are
//! independent). Every case the read model knows receives an
//! `update-case-with-hearing-result` command addressed at its own stream;
//! unknown cases are skipped. The public mirror goes out last, after every
//! case has been told.
//!
//! Case ids address streams, so each must be a string. Lookups and commands
//! read them through the same [`case_ids`] rule.

use event_translator_core::enrichment::EnrichmentQuery;
use event_translator_core::envelope::{Envelope, PayloadError};
use event_translator_core::fan_out::FanOut;
use event_translator_core::projection::PayloadProjection;
use event_translator_core::publish::OutboundSpec;
use event_translator_core::transform::{TransformContext, TransformError};
use event_translator_runtime::{EnrichmentMode, EnrichmentStep, TranslatorBuilder};
use serde_json::{Value, json};

/// Inbound event name.
pub const NAME: &str = "progression.event.hearing-resulted";

/// Command sent to each known case.
pub const UPDATE_CASE_COMMAND: &str = "progression.command.update-case-with-hearing-result";

/// Public mirror, always last.
pub const PUBLIC_NAME: &str = "public.progression.hearing-resulted";

/// Query resolving a prosecution case by id.
pub const CASE_QUERY: &str = "progression.query.case";

/// Configure the translator.
#[must_use]
pub fn configure(builder: TranslatorBuilder) -> TranslatorBuilder {
    builder
        .enrich(EnrichmentStep::each("cases", |envelope| {
            Ok(case_ids(envelope)?
                .into_iter()
                .map(|(case_id, _)| EnrichmentQuery::new(CASE_QUERY, json!({ "caseId": case_id })))
                .collect())
        }))
        .enrichment_mode(EnrichmentMode::Concurrent)
        .transformer(transform)
}

/// The hearing's prosecution cases with their ids, in payload order.
///
/// A missing case list is empty.
///
/// # Errors
///
/// Returns [`PayloadError`] if the list is not an array or a case lacks a
/// string `id`.
pub fn case_ids(envelope: &Envelope) -> Result<Vec<(&str, &Value)>, PayloadError> {
    let cases = match envelope.payload().pointer("/hearing/prosecutionCases") {
        None => return Ok(Vec::new()),
        Some(Value::Array(cases)) => cases,
        Some(_) => {
            return Err(PayloadError::new(envelope.name(), "prosecutionCases is not an array"));
        }
    };
    cases
        .iter()
        .map(|case| {
            case.get("id")
                .and_then(Value::as_str)
                .map(|case_id| (case_id, case))
                .ok_or_else(|| {
                    PayloadError::new(envelope.name(), "prosecution case id must be a string")
                })
        })
        .collect()
}

fn public_projection() -> PayloadProjection {
    PayloadProjection::new()
        .required("/hearing/id", "hearingId")
        .optional("/hearing/courtCentre/code", "courtCentre.code")
        .optional("/hearing/jurisdictionType", "jurisdictionType")
        .copy_optional("sharedTime")
}

/// One command per known case, then the public mirror.
///
/// # Errors
///
/// Returns [`TransformError`] if the hearing id is missing or the case list
/// is malformed (see [`case_ids`]).
pub fn transform(
    envelope: &Envelope,
    context: &TransformContext<'_>,
) -> Result<Vec<OutboundSpec>, TransformError> {
    let payload = envelope.payload();
    let mut public = public_projection().project(payload)?;
    let hearing_id = public.get("hearingId").cloned().unwrap_or(Value::Null);

    let cases = case_ids(envelope)?;

    let mut fan_out = FanOut::new();
    let mut known = Vec::with_capacity(cases.len());
    for ((case_id, case), found) in cases.into_iter().zip(context.enrichments().all("cases")) {
        let Some(summary) = found.value() else {
            continue;
        };
        known.push(Value::from(case_id));
        fan_out = fan_out.command(
            OutboundSpec::new(
                UPDATE_CASE_COMMAND,
                json!({
                    "caseId": case_id,
                    "caseUrn": summary.get("urn").cloned().unwrap_or(Value::Null),
                    "hearingId": hearing_id,
                    "defendants": case.get("defendants").cloned().unwrap_or_else(|| json!([])),
                }),
            )
            .on_stream(case_id),
        );
    }

    if let Value::Object(fields) = &mut public {
        fields.insert("caseIds".to_string(), Value::Array(known));
    }

    Ok(fan_out.mirror(OutboundSpec::new(PUBLIC_NAME, public)).into_specs())
}
