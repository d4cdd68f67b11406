use crate::adapters::store::MessageStore;
use crate::domain::message::{BoundingBox, FeedItem, GeoPoint};
use crate::domain::rating::normalize;
use crate::domain::sampling::{SamplePlan, SamplingPolicy};
use crate::error::Result;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use time::OffsetDateTime;

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) sample_size: Histogram<u64>,
    pub(crate) fallback_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("geofeed-server");
        Self {
            sample_size: meter
                .u64_histogram("geofeed_sample_size")
                .with_description("Number of messages returned by a single sample")
                .build(),
            fallback_total: meter
                .u64_counter("geofeed_sample_fallback_total")
                .with_description("Samples that retried with the opposite sampling-key half")
                .build(),
        }
    }
}

/// Serves randomized, freshness-biased samples of the messages in a viewport.
#[derive(Clone, Debug)]
pub struct FeedService {
    store: Arc<dyn MessageStore>,
    policy: SamplingPolicy,
    metrics: Metrics,
}

impl FeedService {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, policy: SamplingPolicy) -> Self {
        Self { store, policy, metrics: Metrics::new() }
    }

    /// Returns at most `count` messages located between `nw` and `se`.
    ///
    /// A viewport whose corners do not form a box yields an empty sample.
    ///
    /// # Errors
    /// Returns an error if a store query fails.
    #[tracing::instrument(err(level = "warn"), skip(self, nw, se))]
    pub async fn sample(
        &self,
        count: usize,
        exclude_explicit: bool,
        nw: GeoPoint,
        se: GeoPoint,
    ) -> Result<Vec<FeedItem>> {
        let Some(bbox) = BoundingBox::new(nw, se) else {
            tracing::debug!("Viewport does not form a box");
            return Ok(Vec::new());
        };
        if count == 0 {
            return Ok(Vec::new());
        }

        let plan = {
            let mut rng = rand::thread_rng();
            SamplePlan::draw(&self.policy, count, exclude_explicit, bbox, OffsetDateTime::now_utc(), &mut rng)
        };
        self.execute(&plan).await
    }

    /// Runs the queries of an already drawn plan and normalizes the result.
    ///
    /// # Errors
    /// Returns an error if a store query fails.
    pub async fn execute(&self, plan: &SamplePlan) -> Result<Vec<FeedItem>> {
        let mut items = if plan.fresh_count > 0 {
            self.store.find(&plan.fresh_filter(), plan.order, plan.fresh_count).await?
        } else {
            Vec::new()
        };

        let remaining = plan.count.saturating_sub(items.len());
        if remaining > 0 {
            items.extend(self.store.find(&plan.aged_filter(), plan.order, remaining).await?);
        }

        if items.is_empty() {
            tracing::debug!(threshold = plan.threshold, "Sampled half was empty, retrying aged messages from the other half");
            self.metrics.fallback_total.add(1, &[]);
            items = self.store.find(&plan.fallback_filter(), plan.order, plan.count).await?;
        }

        items.truncate(plan.count);
        normalize(&mut items);

        self.metrics.sample_size.record(items.len() as u64, &[]);
        Ok(items)
    }
}
