//! Feature gate that tests can flip between dispatches.

use event_translator_core::feature::FeatureGate;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Runtime-toggleable feature gate. Unset flags are enabled.
#[derive(Debug, Default)]
pub struct ToggleFeatureGate {
    flags: RwLock<HashMap<String, bool>>,
}

impl ToggleFeatureGate {
    /// Gate with every flag enabled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Turn `flag` on.
    pub fn enable(&self, flag: &str) {
        self.set(flag, true);
    }

    /// Turn `flag` off.
    pub fn disable(&self, flag: &str) {
        self.set(flag, false);
    }

    fn set(&self, flag: &str, enabled: bool) {
        self.flags
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(flag.to_string(), enabled);
    }
}

impl FeatureGate for ToggleFeatureGate {
    fn is_enabled(&self, flag: &str) -> bool {
        self.flags
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(flag)
            .copied()
            .unwrap_or(true)
    }
}
