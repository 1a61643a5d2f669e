//! Offence codes resolved against reference data.
//!
//! Reference data is optional: an unknown code is still published, just
//! without a title. Welsh titles are only included while the
//! [`WELSH_TITLES_FLAG`] flag is on.

use event_translator_core::envelope::Envelope;
use event_translator_core::projection::PayloadProjection;
use event_translator_core::publish::OutboundSpec;
use event_translator_core::transform::{TransformContext, TransformError};
use event_translator_runtime::{EnrichmentStep, TranslatorBuilder};
use serde_json::{Map, Value};

/// Inbound event name.
pub const NAME: &str = "progression.event.offence-code-resolved";

/// Public mirror.
pub const PUBLIC_NAME: &str = "public.progression.offence-code-resolved";

/// Reference data query by offence code.
pub const OFFENCE_REFERENCE_QUERY: &str = "referencedata.query.offence";

/// Flag enabling Welsh offence titles in the public event.
pub const WELSH_TITLES_FLAG: &str = "welsh-offence-titles";

/// Configure the translator.
#[must_use]
pub fn configure(builder: TranslatorBuilder) -> TranslatorBuilder {
    builder
        .enrich(EnrichmentStep::field(
            "reference",
            OFFENCE_REFERENCE_QUERY,
            "/offenceCode",
            "cjsOffenceCode",
        ))
        .transformer(transform)
}

fn event_projection() -> PayloadProjection {
    PayloadProjection::new()
        .copy("offenceId")
        .copy("offenceCode")
        .copy("caseId")
        .copy_optional("wording")
        .optional("/startDate", "dates.start")
        .optional("/endDate", "dates.end")
}

fn reference_projection(welsh: bool) -> PayloadProjection {
    let projection = PayloadProjection::new()
        .optional("/title", "offenceTitle")
        .optional("/legislation", "legislation")
        .optional("/modeOfTrial", "modeOfTrial");
    if welsh {
        projection.optional("/welshTitle", "offenceTitleWelsh")
    } else {
        projection
    }
}

/// Public event: the inbound fields plus whatever reference data exists.
///
/// # Errors
///
/// Returns [`TransformError::Projection`] if a required inbound field is
/// missing.
pub fn transform(
    envelope: &Envelope,
    context: &TransformContext<'_>,
) -> Result<Vec<OutboundSpec>, TransformError> {
    let mut public = into_map(event_projection().project(envelope.payload())?);

    if let Some(reference) = context.enrichments().value("reference") {
        let welsh = context.is_enabled(WELSH_TITLES_FLAG);
        public.extend(into_map(reference_projection(welsh).project(reference)?));
    }

    Ok(vec![OutboundSpec::new(PUBLIC_NAME, Value::Object(public))])
}

fn into_map(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use event_translator_core::enrichment::{EnrichmentResult, Enrichments};
    use event_translator_core::feature::FeatureGate;
    use serde_json::json;

    struct Off;

    impl FeatureGate for Off {
        fn is_enabled(&self, _flag: &str) -> bool {
            false
        }
    }

    fn inbound() -> Envelope {
        Envelope::builder()
            .id("m1")
            .name(NAME)
            .payload(json!({
                "offenceId": "o1",
                "offenceCode": "TH68001",
                "caseId": "c1",
                "startDate": "2024-01-02"
            }))
            .build()
            .unwrap()
    }

    #[test]
    fn unknown_code_is_published_without_title() {
        let enrichments = Enrichments::new();
        let context = TransformContext::new(&enrichments, &Off);

        let specs = transform(&inbound(), &context).unwrap();

        assert_eq!(
            specs[0].payload(),
            &json!({
                "offenceId": "o1",
                "offenceCode": "TH68001",
                "caseId": "c1",
                "dates": { "start": "2024-01-02" }
            })
        );
    }

    #[test]
    fn welsh_title_follows_the_flag() {
        let mut enrichments = Enrichments::new();
        enrichments.record(
            "reference",
            EnrichmentResult::Found(json!({ "title": "Theft", "welshTitle": "Lladrad" })),
        );

        let off = TransformContext::new(&enrichments, &Off);
        let specs = transform(&inbound(), &off).unwrap();
        assert_eq!(specs[0].payload()["offenceTitle"], json!("Theft"));
        assert!(specs[0].payload().get("offenceTitleWelsh").is_none());

        let on = TransformContext::new(&enrichments, &event_translator_core::feature::AllFeaturesEnabled);
        let specs = transform(&inbound(), &on).unwrap();
        assert_eq!(specs[0].payload()["offenceTitleWelsh"], json!("Lladrad"));
    }
}
