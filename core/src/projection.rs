//! Declarative payload projection.
//!
//! Outbound payloads are usually a reshaped copy of the inbound one: the same
//! fields under a public name, some optional, some nested. Instead of
//! rebuilding records field by field, a Transformer declares a
//! [`PayloadProjection`] table once and applies it to each payload.
//!
//! Sources are JSON pointers (RFC 6901). Targets are dot-separated paths;
//! intermediate objects are created as needed.
//!
//! # Example
//!
//! ```
//! use event_translator_core::projection::PayloadProjection;
//! use serde_json::json;
//!
//! let projection = PayloadProjection::new()
//!     .required("/hearing/id", "hearingId")
//!     .optional("/hearing/courtCentre/code", "court.code")
//!     .copy("caseId");
//!
//! let projected = projection
//!     .project(&json!({ "hearing": { "id": "h1" }, "caseId": "c1" }))
//!     .unwrap();
//!
//! assert_eq!(projected, json!({ "hearingId": "h1", "caseId": "c1" }));
//! ```

use serde_json::{Map, Value};
use thiserror::Error;

/// Errors raised while applying a projection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    /// A required source field was absent or null.
    #[error("Required field '{pointer}' is missing")]
    MissingField {
        /// JSON pointer of the missing source
        pointer: String,
    },

    /// A target path runs through a non-object value.
    #[error("Target path '{target}' conflicts with an existing value")]
    TargetConflict {
        /// Offending target path
        target: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Pointer { pointer: String, required: bool },
    Constant(Value),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct FieldRule {
    source: Source,
    target: String,
}

/// A field-mapping table from one payload shape to another.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct PayloadProjection {
    rules: Vec<FieldRule>,
}

impl PayloadProjection {
    /// Empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `pointer` to `target`; fail if the source is absent or null.
    pub fn required(self, pointer: impl Into<String>, target: impl Into<String>) -> Self {
        self.pointer(pointer.into(), target.into(), true)
    }

    /// Map `pointer` to `target` when present; omit it otherwise.
    pub fn optional(self, pointer: impl Into<String>, target: impl Into<String>) -> Self {
        self.pointer(pointer.into(), target.into(), false)
    }

    /// Copy a required top-level field under the same name.
    pub fn copy(self, field: &str) -> Self {
        self.required(format!("/{field}"), field)
    }

    /// Copy an optional top-level field under the same name.
    pub fn copy_optional(self, field: &str) -> Self {
        self.optional(format!("/{field}"), field)
    }

    /// Always write `value` at `target`.
    pub fn constant(mut self, target: impl Into<String>, value: Value) -> Self {
        self.rules.push(FieldRule {
            source: Source::Constant(value),
            target: target.into(),
        });
        self
    }

    fn pointer(mut self, pointer: String, target: String, required: bool) -> Self {
        self.rules.push(FieldRule {
            source: Source::Pointer { pointer, required },
            target,
        });
        self
    }

    /// Apply the table to `source`, producing a new object.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::MissingField`] for absent required fields
    /// and [`ProjectionError::TargetConflict`] when two targets overlap
    /// incompatibly.
    pub fn project(&self, source: &Value) -> Result<Value, ProjectionError> {
        let mut out = Map::new();
        for rule in &self.rules {
            let value = match &rule.source {
                Source::Constant(value) => value.clone(),
                Source::Pointer { pointer, required } => {
                    match source.pointer(pointer).filter(|v| !v.is_null()) {
                        Some(value) => value.clone(),
                        None if *required => {
                            return Err(ProjectionError::MissingField {
                                pointer: pointer.clone(),
                            });
                        }
                        None => continue,
                    }
                }
            };
            insert_path(&mut out, &rule.target, value)?;
        }
        Ok(Value::Object(out))
    }
}

fn insert_path(out: &mut Map<String, Value>, target: &str, value: Value) -> Result<(), ProjectionError> {
    let conflict = || ProjectionError::TargetConflict {
        target: target.to_string(),
    };
    let mut segments = target.split('.').peekable();
    let mut node = out;
    while let Some(segment) = segments.next() {
        if segments.peek().is_none() {
            node.insert(segment.to_string(), value);
            return Ok(());
        }
        node = node
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
            .ok_or_else(conflict)?;
    }
    Err(conflict())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn required_null_is_missing() {
        let projection = PayloadProjection::new().copy("caseId");
        assert_eq!(
            projection.project(&json!({ "caseId": null })),
            Err(ProjectionError::MissingField {
                pointer: "/caseId".to_string()
            })
        );
    }

    #[test]
    fn nested_targets_share_parents() {
        let projection = PayloadProjection::new()
            .required("/a", "out.first")
            .required("/b", "out.second")
            .constant("source", json!("progression"));

        let projected = projection.project(&json!({ "a": 1, "b": 2 })).unwrap();
        assert_eq!(
            projected,
            json!({ "out": { "first": 1, "second": 2 }, "source": "progression" })
        );
    }

    #[test]
    fn optional_absent_fields_are_omitted() {
        let projection = PayloadProjection::new()
            .copy("id")
            .copy_optional("note")
            .optional("/deep/value", "value");

        let projected = projection.project(&json!({ "id": "x" })).unwrap();
        assert_eq!(projected, json!({ "id": "x" }));
    }

    #[test]
    fn overlapping_targets_conflict() {
        let projection = PayloadProjection::new()
            .constant("a", json!(1))
            .constant("a.b", json!(2));

        assert_eq!(
            projection.project(&json!({})),
            Err(ProjectionError::TargetConflict {
                target: "a.b".to_string()
            })
        );
    }

    #[test]
    fn arrays_are_copied_whole() {
        let projection = PayloadProjection::new().copy("cases");
        let projected = projection
            .project(&json!({ "cases": [{ "id": 1 }, { "id": 2 }] }))
            .unwrap();
        assert_eq!(projected["cases"][1]["id"], 2);
    }
}
