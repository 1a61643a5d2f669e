//! Feature gate seam.
//!
//! A read-only `flag name -> bool` lookup, managed outside the translator.
//! Handlers evaluate it on every dispatch and never cache the answer, since
//! flags may change between two messages.

use std::sync::Arc;

/// Boolean lookup by flag name.
///
/// Implementations must be side-effect free and cheap enough to call on
/// every dispatch.
pub trait FeatureGate: Send + Sync {
    /// Whether `flag` is currently enabled.
    fn is_enabled(&self, flag: &str) -> bool;
}

impl<G: FeatureGate + ?Sized> FeatureGate for Arc<G> {
    fn is_enabled(&self, flag: &str) -> bool {
        (**self).is_enabled(flag)
    }
}

/// Gate that reports every flag as enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllFeaturesEnabled;

impl FeatureGate for AllFeaturesEnabled {
    fn is_enabled(&self, _flag: &str) -> bool {
        true
    }
}
