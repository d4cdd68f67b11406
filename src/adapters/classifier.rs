use rustrict::{Censor, Type};

/// Decides once, at insertion, whether a message is explicit.
pub trait ContentClassifier: Send + Sync + std::fmt::Debug {
    fn is_explicit(&self, text: &str) -> bool;
}

/// Profanity classifier backed by `rustrict`.
///
/// The analyzer undoes leetspeak, repeated letters and spacing tricks, and
/// matches inflected forms, so `sh1t`, `fuuuck` and `shitting` are all caught.
#[derive(Clone, Copy, Debug)]
pub struct ProfanityFilter {
    threshold: Type,
}

impl Default for ProfanityFilter {
    fn default() -> Self {
        Self { threshold: Type::MODERATE_OR_HIGHER }
    }
}

impl ProfanityFilter {
    /// Flags text whose analysis intersects `threshold`.
    #[must_use]
    pub const fn with_threshold(threshold: Type) -> Self {
        Self { threshold }
    }
}

impl ContentClassifier for ProfanityFilter {
    fn is_explicit(&self, text: &str) -> bool {
        Censor::from_str(text).analyze().is(self.threshold)
    }
}
