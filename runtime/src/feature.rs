//! Configuration-backed feature gate.

use event_translator_core::feature::FeatureGate;
use std::collections::HashSet;

/// Feature gate fixed at startup.
///
/// A flag listed as disabled is off, a flag listed as enabled is on, and
/// every other flag follows the default policy.
#[derive(Debug, Clone, Default)]
pub struct StaticFeatureGate {
    enabled: HashSet<String>,
    disabled: HashSet<String>,
    default_enabled: bool,
}

impl StaticFeatureGate {
    /// Gate where unlisted flags resolve to `default_enabled`.
    #[must_use]
    pub fn new(default_enabled: bool) -> Self {
        Self {
            enabled: HashSet::new(),
            disabled: HashSet::new(),
            default_enabled,
        }
    }

    /// Turn `flag` on.
    #[must_use]
    pub fn enable(mut self, flag: impl Into<String>) -> Self {
        self.enabled.insert(flag.into());
        self
    }

    /// Turn `flag` off. Wins over [`StaticFeatureGate::enable`].
    #[must_use]
    pub fn disable(mut self, flag: impl Into<String>) -> Self {
        self.disabled.insert(flag.into());
        self
    }

    /// Gate from comma-separated flag lists, e.g. the values of
    /// `TRANSLATOR_FEATURES_ENABLED` and `TRANSLATOR_FEATURES_DISABLED`.
    #[must_use]
    pub fn from_lists(enabled: &[String], disabled: &[String], default_enabled: bool) -> Self {
        let gate = enabled
            .iter()
            .fold(Self::new(default_enabled), |gate, flag| gate.enable(flag.clone()));
        disabled.iter().fold(gate, |gate, flag| gate.disable(flag.clone()))
    }
}

impl FeatureGate for StaticFeatureGate {
    fn is_enabled(&self, flag: &str) -> bool {
        if self.disabled.contains(flag) {
            return false;
        }
        self.enabled.contains(flag) || self.default_enabled
    }
}
