//! Per-translator scenarios, written with the Given/When/Then harness.

#![allow(clippy::unwrap_used)]

use event_translator_catalog::{
    case_status_changed, custody_time_limit_extended, entity_changed, hearing_resulted,
    offence_code_resolved,
};
use event_translator_core::enrichment::EnrichmentQuery;
use event_translator_core::envelope::Envelope;
use event_translator_core::handler::HandlerError;
use event_translator_runtime::Translation;
use event_translator_testing::TranslatorTest;
use event_translator_testing::fixtures::envelope;
use serde_json::json;

fn x_changed() -> Envelope {
    Envelope::builder()
        .id("m1")
        .name("X-changed")
        .correlation_id("c1")
        .payload(json!({ "entityId": "e1" }))
        .build()
        .unwrap()
}

fn entity_query() -> EnrichmentQuery {
    EnrichmentQuery::new(entity_changed::ENTITY_QUERY, json!({ "entityId": "e1" }))
}

#[tokio::test]
async fn known_entity_is_mirrored_publicly() {
    TranslatorTest::new(entity_changed::NAME, entity_changed::configure)
        .given_found(entity_query(), json!({ "status": "ACTIVE" }))
        .when(x_changed())
        .then_published(|published| {
            assert_eq!(published.len(), 1);
            let public = &published[0];
            assert_eq!(public.name(), "public.X-changed");
            assert_eq!(public.payload()["entityId"], json!("e1"));
            assert_eq!(public.payload()["status"], json!("ACTIVE"));
            assert_eq!(public.correlation_id(), "c1");
            assert_eq!(public.causation_id(), Some("m1"));
        })
        .then_queries(|queries| assert_eq!(queries, [entity_query()]))
        .run()
        .await;
}

#[tokio::test]
async fn unknown_entity_publishes_nothing() {
    TranslatorTest::new(entity_changed::NAME, entity_changed::configure)
        .when(x_changed())
        .then_translation(|translation| {
            assert_eq!(
                translation,
                &Translation::MissingEntity {
                    step: "entity".to_string()
                }
            );
        })
        .then_published(|published| assert!(published.is_empty()))
        .run()
        .await;
}

#[tokio::test]
async fn query_api_outage_fails_the_dispatch() {
    TranslatorTest::new(entity_changed::NAME, entity_changed::configure)
        .given_failing(entity_changed::ENTITY_QUERY, 1)
        .when(x_changed())
        .then_error(|error| {
            assert!(matches!(error, HandlerError::Enrichment(_)));
            assert!(error.is_retryable());
        })
        .then_published(|published| assert!(published.is_empty()))
        .run()
        .await;
}

#[tokio::test]
async fn case_status_change_carries_the_urn() {
    TranslatorTest::new(case_status_changed::NAME, case_status_changed::configure)
        .given_found_for_name(case_status_changed::CASE_QUERY, json!({ "urn": "TFL123" }))
        .when(envelope(
            "m1",
            case_status_changed::NAME,
            json!({ "caseId": "c1", "caseStatus": "CLOSED", "changedAt": "2024-05-01" }),
        ))
        .then_published(|published| {
            assert_eq!(published.len(), 1);
            assert_eq!(published[0].name(), case_status_changed::PUBLIC_NAME);
            assert_eq!(
                published[0].payload(),
                &json!({
                    "caseId": "c1",
                    "caseUrn": "TFL123",
                    "caseStatus": "CLOSED",
                    "changedAt": "2024-05-01"
                })
            );
        })
        .run()
        .await;
}

#[tokio::test]
async fn malformed_case_status_is_not_retryable() {
    TranslatorTest::new(case_status_changed::NAME, case_status_changed::configure)
        .given_found_for_name(case_status_changed::CASE_QUERY, json!({ "urn": "TFL123" }))
        .when(envelope("m1", case_status_changed::NAME, json!({ "caseId": "c1" })))
        .then_error(|error| assert!(!error.is_retryable()))
        .run()
        .await;
}

#[tokio::test]
async fn hearing_result_commands_each_known_case_then_mirrors() {
    let payload = json!({
        "hearing": {
            "id": "h1",
            "prosecutionCases": [{ "id": "c1" }, { "id": "c2" }]
        }
    });

    TranslatorTest::new(hearing_resulted::NAME, hearing_resulted::configure)
        .given_found(
            EnrichmentQuery::new(hearing_resulted::CASE_QUERY, json!({ "caseId": "c2" })),
            json!({ "urn": "U2" }),
        )
        .when(envelope("m1", hearing_resulted::NAME, payload))
        .then_published(|published| {
            let names: Vec<_> = published.iter().map(Envelope::name).collect();
            assert_eq!(
                names,
                [hearing_resulted::UPDATE_CASE_COMMAND, hearing_resulted::PUBLIC_NAME]
            );
            assert_eq!(published[0].stream_id(), Some("c2"));
            assert_eq!(published[0].payload()["caseUrn"], json!("U2"));
            assert_eq!(published[1].payload()["caseIds"], json!(["c2"]));
        })
        .then_queries(|queries| assert_eq!(queries.len(), 2))
        .run()
        .await;
}

#[tokio::test]
async fn hearing_with_too_many_cases_exceeds_the_budget() {
    let cases: Vec<_> = (0..5).map(|i| json!({ "id": format!("c{i}") })).collect();

    TranslatorTest::new(hearing_resulted::NAME, |t| {
        hearing_resulted::configure(t).max_enrichment_calls(4)
    })
    .when(envelope(
        "m1",
        hearing_resulted::NAME,
        json!({ "hearing": { "id": "h1", "prosecutionCases": cases } }),
    ))
    .then_error(|error| {
        assert!(matches!(
            error,
            HandlerError::EnrichmentBudgetExceeded {
                requested: 5,
                limit: 4
            }
        ));
    })
    .then_queries(|queries| assert!(queries.is_empty()))
    .run()
    .await;
}

#[tokio::test]
async fn hearing_with_numeric_case_id_is_malformed() {
    TranslatorTest::new(hearing_resulted::NAME, hearing_resulted::configure)
        .given_found_for_name(hearing_resulted::CASE_QUERY, json!({ "urn": "U7" }))
        .when(envelope(
            "m1",
            hearing_resulted::NAME,
            json!({ "hearing": { "id": "h1", "prosecutionCases": [{ "id": 7 }] } }),
        ))
        .then_error(|error| {
            assert!(matches!(error, HandlerError::MalformedPayload(_)));
            assert!(!error.is_retryable());
        })
        .then_queries(|queries| assert!(queries.is_empty()))
        .then_published(|published| assert!(published.is_empty()))
        .run()
        .await;
}

#[tokio::test]
async fn entity_change_without_entity_id_publishes_nothing() {
    TranslatorTest::new(entity_changed::NAME, entity_changed::configure)
        .given_found_for_name(entity_changed::ENTITY_QUERY, json!({ "status": "ACTIVE" }))
        .when(envelope("m1", entity_changed::NAME, json!({ "other": 1 })))
        .then_translation(|translation| {
            assert!(matches!(translation, Translation::MissingEntity { .. }));
        })
        .then_queries(|queries| assert!(queries.is_empty()))
        .then_published(|published| assert!(published.is_empty()))
        .run()
        .await;
}

fn extension() -> Envelope {
    envelope(
        "m1",
        custody_time_limit_extended::NAME,
        json!({ "hearingId": "h1", "offenceId": "o1", "extendedTimeLimit": "2024-09-01" }),
    )
}

#[tokio::test]
async fn extension_commands_the_case_before_announcing() {
    TranslatorTest::new(
        custody_time_limit_extended::NAME,
        custody_time_limit_extended::configure,
    )
    .given_found_for_name(
        custody_time_limit_extended::OFFENCE_QUERY,
        json!({ "caseId": "c1", "defendantId": "d1" }),
    )
    .when(extension())
    .then_published(|published| {
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].name(), custody_time_limit_extended::EXTEND_COMMAND);
        assert_eq!(published[1].name(), custody_time_limit_extended::PUBLIC_NAME);
        assert_eq!(published[0].stream_id(), Some("c1"));
        assert_eq!(
            published[0].payload(),
            &json!({ "caseId": "c1", "offenceId": "o1", "extendedTimeLimit": "2024-09-01" })
        );
    })
    .run()
    .await;
}

#[tokio::test]
async fn disabled_extension_succeeds_without_lookups() {
    TranslatorTest::new(
        custody_time_limit_extended::NAME,
        custody_time_limit_extended::configure,
    )
    .given_found_for_name(custody_time_limit_extended::OFFENCE_QUERY, json!({ "caseId": "c1" }))
    .given_disabled(custody_time_limit_extended::FEATURE_FLAG)
    .when(extension())
    .then_translation(|translation| {
        assert!(matches!(translation, Translation::Disabled { .. }));
    })
    .then_published(|published| assert!(published.is_empty()))
    .then_queries(|queries| assert!(queries.is_empty()))
    .run()
    .await;
}

#[tokio::test]
async fn offence_code_without_reference_data_is_still_published() {
    TranslatorTest::new(offence_code_resolved::NAME, offence_code_resolved::configure)
        .when(envelope(
            "m1",
            offence_code_resolved::NAME,
            json!({ "offenceId": "o1", "offenceCode": "TH68001", "caseId": "c1" }),
        ))
        .then_published(|published| {
            assert_eq!(published.len(), 1);
            assert!(published[0].payload().get("offenceTitle").is_none());
        })
        .run()
        .await;
}

#[tokio::test]
async fn offence_code_gets_reference_title() {
    TranslatorTest::new(offence_code_resolved::NAME, offence_code_resolved::configure)
        .given_found(
            EnrichmentQuery::new(
                offence_code_resolved::OFFENCE_REFERENCE_QUERY,
                json!({ "cjsOffenceCode": "TH68001" }),
            ),
            json!({ "title": "Theft from a shop", "legislation": "Theft Act 1968 s.1" }),
        )
        .given_disabled(offence_code_resolved::WELSH_TITLES_FLAG)
        .when(envelope(
            "m1",
            offence_code_resolved::NAME,
            json!({ "offenceId": "o1", "offenceCode": "TH68001", "caseId": "c1" }),
        ))
        .then_published(|published| {
            let payload = published[0].payload();
            assert_eq!(payload["offenceTitle"], json!("Theft from a shop"));
            assert_eq!(payload["legislation"], json!("Theft Act 1968 s.1"));
        })
        .run()
        .await;
}
