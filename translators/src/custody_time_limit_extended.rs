//! Custody time limit extensions.
//!
//! Guarded by the [`FEATURE_FLAG`] flag. When active, the owning case is
//! resolved from the offence and told to extend the limit; the public event
//! follows, and must never be observable before the case has the new limit.

use event_translator_core::envelope::Envelope;
use event_translator_core::fan_out::FanOut;
use event_translator_core::projection::PayloadProjection;
use event_translator_core::publish::OutboundSpec;
use event_translator_core::transform::{TransformContext, TransformError};
use event_translator_runtime::{EnrichmentStep, TranslatorBuilder};
use serde_json::Value;

/// Inbound event name.
pub const NAME: &str = "progression.event.custody-time-limit-extended";

/// Command to the owning case, published first.
pub const EXTEND_COMMAND: &str = "progression.command.extend-custody-time-limit";

/// Public mirror, published after the command.
pub const PUBLIC_NAME: &str = "public.progression.custody-time-limit-extended";

/// Flag guarding the translator.
pub const FEATURE_FLAG: &str = "custody-time-limit-extension";

/// Query resolving an offence to its case and defendant.
pub const OFFENCE_QUERY: &str = "progression.query.offence";

/// Configure the translator.
#[must_use]
pub fn configure(builder: TranslatorBuilder) -> TranslatorBuilder {
    builder
        .gated_by(FEATURE_FLAG)
        .enrich(EnrichmentStep::field("offence", OFFENCE_QUERY, "/offenceId", "offenceId").required())
        .transformer(transform)
}

/// Extend-command for the owning case, then the public event.
///
/// # Errors
///
/// Returns [`TransformError`] if the offence id or new limit is missing, or
/// the offence lookup has no case id.
pub fn transform(
    envelope: &Envelope,
    context: &TransformContext<'_>,
) -> Result<Vec<OutboundSpec>, TransformError> {
    let offence = context.enrichments().value("offence").cloned().unwrap_or(Value::Null);
    let case_id = PayloadProjection::new().copy("caseId").project(&offence)?;
    let Some(case_id) = case_id.get("caseId").and_then(Value::as_str) else {
        return Err(TransformError::Rejected("offence has no string caseId".to_string()));
    };

    let command = PayloadProjection::new()
        .constant("caseId", Value::from(case_id))
        .copy("offenceId")
        .copy("extendedTimeLimit")
        .project(envelope.payload())?;

    let public = PayloadProjection::new()
        .copy_optional("hearingId")
        .copy("offenceId")
        .constant("caseId", Value::from(case_id))
        .copy("extendedTimeLimit")
        .project(envelope.payload())?;

    Ok(FanOut::new()
        .command(OutboundSpec::new(EXTEND_COMMAND, command).on_stream(case_id))
        .mirror(OutboundSpec::new(PUBLIC_NAME, public))
        .into_specs())
}
