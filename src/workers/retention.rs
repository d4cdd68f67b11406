use crate::adapters::store::{MessageStore, RetainedFields, WriteOutcome};
use crate::config::RetentionConfig;
use crate::domain::message::Message;
use crate::domain::retention::{RetentionPolicy, Verdict};
use crate::error::Result;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram},
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use tokio::sync::watch;
use tracing::Instrument;

#[derive(Clone, Debug)]
struct Metrics {
    evicted: Counter<u64>,
    votes_pruned: Counter<u64>,
    errors: Counter<u64>,
    sweep_duration: Histogram<f64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("geofeed-server");
        Self {
            evicted: meter
                .u64_counter("geofeed_retention_evicted_total")
                .with_description("Total messages deleted for missing their vote quota")
                .build(),
            votes_pruned: meter
                .u64_counter("geofeed_retention_votes_pruned_total")
                .with_description("Total votes discarded for falling outside the voting window")
                .build(),
            errors: meter
                .u64_counter("geofeed_retention_errors_total")
                .with_description("Total messages the retention sweep failed to process")
                .build(),
            sweep_duration: meter
                .f64_histogram("geofeed_retention_sweep_duration_seconds")
                .with_description("Wall time of a full retention sweep")
                .build(),
        }
    }
}

/// Counts of what one sweep did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: u64,
    pub exempt: u64,
    pub unchanged: u64,
    pub retained: u64,
    pub evicted: u64,
    pub votes_pruned: u64,
    /// Messages still conflicting after every retry; judged again next cycle.
    pub deferred: u64,
    pub failed: u64,
    /// Set when shutdown interrupted the sweep.
    pub abandoned: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Disposition {
    Exempt,
    Unchanged,
    Retained { pruned: usize },
    Evicted { within_window: usize, quota: f64 },
    /// Deleted by someone else while being judged.
    Gone,
    Deferred,
}

impl SweepReport {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Exempt => self.exempt += 1,
            Disposition::Unchanged => self.unchanged += 1,
            Disposition::Retained { pruned } => {
                self.retained += 1;
                self.votes_pruned += pruned as u64;
            }
            Disposition::Evicted { .. } => self.evicted += 1,
            Disposition::Gone => {}
            Disposition::Deferred => self.deferred += 1,
        }
    }
}

/// Periodically re-judges every stored message against its vote quota,
/// pruning expired votes, re-rating survivors and evicting the rest.
#[derive(Debug)]
pub struct RetentionWorker {
    store: Arc<dyn MessageStore>,
    policy: RetentionPolicy,
    interval: Duration,
    batch_size: usize,
    conflict_retries: usize,
    metrics: Metrics,
}

impl RetentionWorker {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, config: &RetentionConfig) -> Self {
        Self {
            store,
            policy: config.retention_policy(),
            interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            batch_size: config.scan_batch_size.max(1),
            conflict_retries: config.conflict_retries,
            metrics: Metrics::new(),
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = interval.tick() => {
                    let started = Instant::now();
                    match self.sweep(&shutdown).instrument(tracing::info_span!("retention_sweep")).await {
                        Ok(report) => {
                            self.metrics.sweep_duration.record(started.elapsed().as_secs_f64(), &[]);
                            if report.evicted > 0 || report.votes_pruned > 0 || report.failed > 0 {
                                tracing::info!(?report, "Retention sweep completed");
                            } else {
                                tracing::debug!(?report, "Retention sweep completed");
                            }
                        }
                        Err(e) => tracing::error!(error = ?e, "Retention sweep could not scan the store, skipping cycle"),
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
        tracing::info!("Retention loop shutting down...");
    }

    /// Runs one full pass over the store.
    ///
    /// Failures on individual messages are logged and counted; the pass moves
    /// on. Shutdown is honoured between messages.
    ///
    /// # Errors
    /// Returns an error if a page of the scan cannot be read.
    pub async fn sweep(&self, shutdown: &watch::Receiver<bool>) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let mut cursor = None;

        loop {
            let page = self.store.scan_page(cursor, self.batch_size).await?;
            let page_len = page.len();
            cursor = page.last().map(|m| m.id);

            for message in page {
                if *shutdown.borrow() {
                    tracing::info!(scanned = report.scanned, "Shutdown requested, abandoning retention sweep");
                    report.abandoned = true;
                    return Ok(report);
                }

                report.scanned += 1;
                let id = message.id;
                match self.process(message).instrument(tracing::debug_span!("retain_message", message.id = %id)).await
                {
                    Ok(disposition) => {
                        match disposition {
                            Disposition::Retained { pruned } if pruned > 0 => {
                                self.metrics.votes_pruned.add(pruned as u64, &[]);
                            }
                            Disposition::Evicted { within_window, quota } => {
                                tracing::info!(message.id = %id, within_window, quota, "Evicted message below vote quota");
                                self.metrics.evicted.add(1, &[]);
                            }
                            Disposition::Deferred => {
                                tracing::warn!(message.id = %id, "Message kept changing during sweep, deferring");
                            }
                            _ => {}
                        }
                        report.record(disposition);
                    }
                    Err(e) => {
                        tracing::error!(message.id = %id, error = ?e, "Retention failed for message, continuing");
                        self.metrics.errors.add(1, &[]);
                        report.failed += 1;
                    }
                }
            }

            if page_len < self.batch_size {
                break;
            }
        }

        Ok(report)
    }

    /// Judges one message and applies the verdict with a revision check.
    ///
    /// A conflict means a vote landed after the read; the message is fetched
    /// again and re-judged so the new vote is neither lost nor ignored.
    async fn process(&self, message: Message) -> Result<Disposition> {
        let mut current = message;

        for attempt in 0..=self.conflict_retries {
            let now = OffsetDateTime::now_utc();

            let (outcome, applied) = match self.policy.evaluate(&current, now) {
                Verdict::Exempt => return Ok(Disposition::Exempt),
                Verdict::Evict { within_window, quota } => (
                    self.store.delete(current.id, current.revision).await?,
                    Disposition::Evicted { within_window, quota },
                ),
                Verdict::Retain { votes, pruned, rating } => {
                    if pruned == 0 && (rating - current.rating).abs() < f64::EPSILON {
                        return Ok(Disposition::Unchanged);
                    }
                    (
                        self.store.set_fields(current.id, current.revision, RetainedFields { votes, rating }).await?,
                        Disposition::Retained { pruned },
                    )
                }
            };

            match outcome {
                WriteOutcome::Applied => return Ok(applied),
                WriteOutcome::Missing => return Ok(Disposition::Gone),
                WriteOutcome::Conflict => {
                    tracing::debug!(attempt, "Message changed since it was read, re-evaluating");
                    match self.store.fetch(current.id).await? {
                        Some(fresh) => current = fresh,
                        None => return Ok(Disposition::Gone),
                    }
                }
            }
        }

        Ok(Disposition::Deferred)
    }
}
