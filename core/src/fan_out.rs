//! Ordered fan-out builder.
//!
//! One inbound event may produce several outbound messages:
//!
//! - commands directed at other capabilities of the same context
//! - one message per element of a payload collection
//! - additional events
//! - a public event mirroring the private one
//!
//! When a translator both mutates state through a command and announces a
//! public event, observers of the public event may depend on the command's
//! effect already being visible. [`FanOut`] therefore emits, in order:
//! commands, then other events, then the mirrored public event last.
//! Translators whose ordering is unconstrained in the other direction can
//! call [`FanOut::mirror_first`].
//!
//! # Example
//!
//! ```
//! use event_translator_core::fan_out::FanOut;
//! use event_translator_core::publish::OutboundSpec;
//! use serde_json::json;
//!
//! let specs = FanOut::new()
//!     .mirror(OutboundSpec::new("public.progression.hearing-resulted", json!({})))
//!     .command(OutboundSpec::new("progression.command.update-case", json!({ "caseId": "c1" })))
//!     .command(OutboundSpec::new("progression.command.update-case", json!({ "caseId": "c2" })))
//!     .into_specs();
//!
//! let names: Vec<_> = specs.iter().map(OutboundSpec::name).collect();
//! assert_eq!(names.last(), Some(&"public.progression.hearing-resulted"));
//! ```

use crate::publish::OutboundSpec;

/// Collects outbound specs and releases them in publishing order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct FanOut {
    commands: Vec<OutboundSpec>,
    events: Vec<OutboundSpec>,
    mirror: Option<OutboundSpec>,
    mirror_first: bool,
}

impl FanOut {
    /// Empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a command.
    pub fn command(mut self, spec: OutboundSpec) -> Self {
        self.commands.push(spec);
        self
    }

    /// Add a command only when `condition` holds.
    pub fn command_if(self, condition: bool, spec: impl FnOnce() -> OutboundSpec) -> Self {
        if condition { self.command(spec()) } else { self }
    }

    /// Add one command per item, in iteration order.
    pub fn commands(mut self, specs: impl IntoIterator<Item = OutboundSpec>) -> Self {
        self.commands.extend(specs);
        self
    }

    /// Add an event that is not the one-to-one mirror.
    pub fn event(mut self, spec: OutboundSpec) -> Self {
        self.events.push(spec);
        self
    }

    /// Set the mirrored public event. A later call replaces an earlier one.
    pub fn mirror(mut self, spec: OutboundSpec) -> Self {
        self.mirror = Some(spec);
        self
    }

    /// Publish the mirrored public event before everything else.
    pub const fn mirror_first(mut self) -> Self {
        self.mirror_first = true;
        self
    }

    /// Number of messages collected.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len() + self.events.len() + usize::from(self.mirror.is_some())
    }

    /// Whether nothing will be published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release the specs in publishing order.
    #[must_use]
    pub fn into_specs(self) -> Vec<OutboundSpec> {
        let mut specs = Vec::with_capacity(self.len());
        let (leading, trailing) = if self.mirror_first {
            (self.mirror, None)
        } else {
            (None, self.mirror)
        };
        specs.extend(leading);
        specs.extend(self.commands);
        specs.extend(self.events);
        specs.extend(trailing);
        specs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str) -> OutboundSpec {
        OutboundSpec::new(name, json!({}))
    }

    fn names(specs: &[OutboundSpec]) -> Vec<&str> {
        specs.iter().map(OutboundSpec::name).collect()
    }

    #[test]
    fn mirror_is_published_last_by_default() {
        let specs = FanOut::new()
            .mirror(spec("public.a"))
            .event(spec("event.b"))
            .command(spec("cmd.c"))
            .into_specs();

        assert_eq!(names(&specs), vec!["cmd.c", "event.b", "public.a"]);
    }

    #[test]
    fn mirror_first_reverses_the_policy() {
        let specs = FanOut::new()
            .command(spec("cmd.c"))
            .mirror(spec("public.a"))
            .mirror_first()
            .into_specs();

        assert_eq!(names(&specs), vec!["public.a", "cmd.c"]);
    }

    #[test]
    fn commands_keep_insertion_order() {
        let specs = FanOut::new()
            .commands(["1", "2", "3"].map(spec))
            .command_if(false, || spec("skipped"))
            .command_if(true, || spec("4"))
            .into_specs();

        assert_eq!(names(&specs), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn empty_fan_out_publishes_nothing() {
        let fan_out = FanOut::new();
        assert!(fan_out.is_empty());
        assert!(fan_out.into_specs().is_empty());
    }
}
