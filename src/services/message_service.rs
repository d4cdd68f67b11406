use crate::adapters::classifier::ContentClassifier;
use crate::adapters::store::{MessageStore, VoteOutcome};
use crate::domain::message::{GeoPoint, MessageId, NewMessage, Vote, now_millis};
use crate::error::Result;
use opentelemetry::{
    KeyValue, global,
    metrics::Counter,
};
use rand::Rng;
use std::sync::Arc;

/// Author recorded on bulk-loaded messages.
pub const SEED_AUTHOR: &str = "seeder";

#[derive(Clone, Debug)]
pub(crate) struct Metrics {
    pub(crate) created_total: Counter<u64>,
    pub(crate) votes_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("geofeed-server");
        Self {
            created_total: meter
                .u64_counter("geofeed_messages_created_total")
                .with_description("Total messages posted to the feed")
                .build(),
            votes_total: meter
                .u64_counter("geofeed_votes_total")
                .with_description("Total vote attempts by outcome")
                .build(),
        }
    }
}

/// Ingestion, voting and administrative operations on stored messages.
#[derive(Clone, Debug)]
pub struct MessageService {
    store: Arc<dyn MessageStore>,
    classifier: Arc<dyn ContentClassifier>,
    metrics: Metrics,
}

impl MessageService {
    #[must_use]
    pub fn new(store: Arc<dyn MessageStore>, classifier: Arc<dyn ContentClassifier>) -> Self {
        Self { store, classifier, metrics: Metrics::new() }
    }

    /// Posts a new message at `location`.
    ///
    /// Text and coordinates are stored as given; a location outside any valid
    /// viewport simply never shows up in a sample.
    ///
    /// # Errors
    /// Returns an error if the store rejects the insert.
    #[tracing::instrument(err(level = "warn"), skip(self, author_id, text), fields(text_len = text.len()))]
    pub async fn create_message(&self, author_id: String, text: String, location: GeoPoint) -> Result<MessageId> {
        let flagged_explicit = self.classifier.is_explicit(&text);
        let sampling_key = rand::thread_rng().r#gen::<f64>();

        let id = self
            .store
            .insert(NewMessage { author_id, text, location, created_at: now_millis(), flagged_explicit, sampling_key })
            .await?;

        tracing::debug!(message_id = %id, flagged_explicit, "Message stored");
        self.metrics.created_total.add(1, &[KeyValue::new("explicit", flagged_explicit)]);
        Ok(id)
    }

    /// Bulk-loads `texts` as new messages scattered uniformly within
    /// `spread_deg` degrees of `center`, classified and keyed like posted ones.
    ///
    /// # Errors
    /// Returns an error if the store rejects the batch.
    #[tracing::instrument(err, skip(self, texts), fields(lines = texts.len()))]
    pub async fn seed(&self, texts: Vec<String>, center: GeoPoint, spread_deg: f64) -> Result<usize> {
        let spread = if spread_deg.is_finite() { spread_deg.abs() } else { 0.0 };
        let created_at = now_millis();

        let batch: Vec<NewMessage> = {
            let mut rng = rand::thread_rng();
            texts
                .into_iter()
                .map(|text| NewMessage {
                    author_id: SEED_AUTHOR.to_string(),
                    flagged_explicit: self.classifier.is_explicit(&text),
                    location: GeoPoint::new(
                        center.lng + rng.gen_range(-spread..=spread),
                        center.lat + rng.gen_range(-spread..=spread),
                    ),
                    sampling_key: rng.r#gen::<f64>(),
                    created_at,
                    text,
                })
                .collect()
        };

        let inserted = self.store.insert_many(batch).await?.len();
        tracing::info!(inserted, "Seeded messages");
        Ok(inserted)
    }

    /// Records one vote from `voter_id` on `message_id`.
    ///
    /// Repeat votes and votes on unknown messages are no-ops reported through
    /// the outcome, not errors.
    ///
    /// # Errors
    /// Returns an error if the store cannot be reached.
    #[tracing::instrument(err(level = "warn"), skip(self, voter_id), fields(message_id = %message_id))]
    pub async fn cast_vote(&self, message_id: MessageId, voter_id: String) -> Result<VoteOutcome> {
        let outcome = self.store.append_vote(message_id, Vote::new(voter_id, now_millis())).await?;

        match outcome {
            VoteOutcome::Recorded => tracing::debug!("Vote recorded"),
            VoteOutcome::Duplicate => tracing::debug!("Duplicate vote ignored"),
            VoteOutcome::NotFound => tracing::debug!("Vote for unknown message ignored"),
        }
        self.metrics.votes_total.add(1, &[KeyValue::new("status", outcome.as_str())]);
        Ok(outcome)
    }

    /// # Errors
    /// Returns an error if the store cannot be reached.
    pub async fn count(&self) -> Result<u64> {
        self.store.count().await
    }

    /// Deletes every message. Administrative use only.
    ///
    /// # Errors
    /// Returns an error if the store cannot be reached.
    #[tracing::instrument(err, skip(self))]
    pub async fn purge_all(&self) -> Result<u64> {
        let deleted = self.store.purge_all().await?;
        tracing::warn!(deleted, "Purged all messages");
        Ok(deleted)
    }
}
