use crate::domain::message::{BoundingBox, Message};
use rand::Rng;
use time::{Duration, OffsetDateTime};

/// Threshold above which the sampling key acts as a ceiling instead of a floor.
const KEY_SPLIT: f64 = 0.5;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplingPolicy {
    /// Messages younger than this are "fresh".
    pub fresh_window: Duration,
    /// Share of each sample reserved for fresh messages.
    pub fresh_fraction: f64,
}

impl Default for SamplingPolicy {
    fn default() -> Self {
        Self { fresh_window: Duration::HOUR, fresh_fraction: 0.2 }
    }
}

impl SamplingPolicy {
    /// `ceil(count * fresh_fraction)`, never more than `count`.
    #[must_use]
    #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn fresh_count(&self, count: usize) -> usize {
        let share = (count as f64 * self.fresh_fraction.clamp(0.0, 1.0)).ceil();
        (share as usize).min(count)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Which half of the sampling-key population a query may draw from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum KeyBound {
    AtMost(f64),
    AtLeast(f64),
}

impl KeyBound {
    #[must_use]
    pub const fn flipped(self) -> Self {
        match self {
            Self::AtMost(t) => Self::AtLeast(t),
            Self::AtLeast(t) => Self::AtMost(t),
        }
    }

    #[must_use]
    pub fn admits(self, key: f64) -> bool {
        match self {
            Self::AtMost(t) => key <= t,
            Self::AtLeast(t) => key >= t,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Recency {
    /// `created_at > since`
    Fresh { since: OffsetDateTime },
    /// `created_at <= until`
    Aged { until: OffsetDateTime },
}

impl Recency {
    #[must_use]
    pub fn admits(self, created_at: OffsetDateTime) -> bool {
        match self {
            Self::Fresh { since } => created_at > since,
            Self::Aged { until } => created_at <= until,
        }
    }
}

/// A single store query issued while sampling.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleFilter {
    pub bbox: BoundingBox,
    pub exclude_explicit: bool,
    pub recency: Recency,
    pub key: KeyBound,
}

impl SampleFilter {
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        self.bbox.contains(message.location)
            && !(self.exclude_explicit && message.flagged_explicit)
            && self.recency.admits(message.created_at)
            && self.key.admits(message.sampling_key)
    }
}

/// The random choices of one sample call, fixed up front.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplePlan {
    pub count: usize,
    pub fresh_count: usize,
    pub threshold: f64,
    pub order: SortOrder,
    pub cutoff: OffsetDateTime,
    pub bbox: BoundingBox,
    pub exclude_explicit: bool,
}

impl SamplePlan {
    #[must_use]
    pub fn draw<R: Rng + ?Sized>(
        policy: &SamplingPolicy,
        count: usize,
        exclude_explicit: bool,
        bbox: BoundingBox,
        now: OffsetDateTime,
        rng: &mut R,
    ) -> Self {
        let threshold = rng.r#gen::<f64>();
        let order = if rng.r#gen::<bool>() { SortOrder::Ascending } else { SortOrder::Descending };
        Self {
            count,
            fresh_count: policy.fresh_count(count),
            threshold,
            order,
            cutoff: now.checked_sub(policy.fresh_window).unwrap_or(OffsetDateTime::UNIX_EPOCH),
            bbox,
            exclude_explicit,
        }
    }

    #[must_use]
    pub fn key_bound(&self) -> KeyBound {
        if self.threshold > KEY_SPLIT { KeyBound::AtMost(self.threshold) } else { KeyBound::AtLeast(self.threshold) }
    }

    #[must_use]
    pub fn fresh_filter(&self) -> SampleFilter {
        self.filter(Recency::Fresh { since: self.cutoff }, self.key_bound())
    }

    #[must_use]
    pub fn aged_filter(&self) -> SampleFilter {
        self.filter(Recency::Aged { until: self.cutoff }, self.key_bound())
    }

    /// Used when both slices came back empty: aged messages from the other
    /// key half. Fresh messages are only ever reached by the fresh slice.
    #[must_use]
    pub fn fallback_filter(&self) -> SampleFilter {
        self.filter(Recency::Aged { until: self.cutoff }, self.key_bound().flipped())
    }

    const fn filter(&self, recency: Recency, key: KeyBound) -> SampleFilter {
        SampleFilter { bbox: self.bbox, exclude_explicit: self.exclude_explicit, recency, key }
    }
}
