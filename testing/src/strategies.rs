//! Property-based testing strategies using proptest.

use chrono::{DateTime, TimeZone, Utc};
use event_translator_core::envelope::{Envelope, UserContext};
use proptest::prelude::*;
use serde_json::{Map, Value};

/// Message ids: short lowercase tokens, never empty.
pub fn arb_id() -> impl Strategy<Value = String> {
    "[a-z0-9]{1,12}"
}

/// Dotted message names with two to four segments.
pub fn arb_name() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-z][a-z-]{0,10}", 2..=4).prop_map(|segments| segments.join("."))
}

/// Flat JSON objects with string and integer fields.
pub fn arb_payload() -> impl Strategy<Value = Value> {
    proptest::collection::btree_map(
        "[a-zA-Z]{1,8}",
        prop_oneof![
            "[a-z0-9 ]{0,12}".prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
        ],
        0..6,
    )
    .prop_map(|fields| Value::Object(fields.into_iter().collect::<Map<String, Value>>()))
}

fn arb_created_at() -> impl Strategy<Value = DateTime<Utc>> {
    (1_600_000_000i64..1_900_000_000).prop_map(|secs| {
        Utc.timestamp_opt(secs, 0).single().unwrap_or_default()
    })
}

/// Complete inbound envelopes.
pub fn arb_envelope() -> impl Strategy<Value = Envelope> {
    (
        arb_id(),
        arb_name(),
        proptest::option::of(arb_id()),
        proptest::option::of("[a-z0-9-]{1,12}"),
        proptest::option::of(arb_id()),
        arb_created_at(),
        arb_payload(),
    )
        .prop_filter_map(
            "envelope must build",
            |(id, name, correlation_id, stream_id, user_id, created_at, payload)| {
                let mut builder = Envelope::builder()
                    .id(id)
                    .name(name)
                    .stream_id(stream_id)
                    .user_context(user_id.map(UserContext::user))
                    .created_at(created_at)
                    .payload(payload);
                if let Some(correlation_id) = correlation_id {
                    builder = builder.correlation_id(correlation_id);
                }
                builder.build().ok()
            },
        )
}
