use crate::domain::message::{FeedItem, GeoPoint, Message, Vote};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use time::OffsetDateTime;
use uuid::Uuid;

/// One element of the `votes` JSONB array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteRecord {
    pub voter_id: String,
    /// Unix epoch milliseconds.
    pub cast_at: i64,
}

impl From<&Vote> for VoteRecord {
    fn from(vote: &Vote) -> Self {
        let millis = vote.cast_at.unix_timestamp_nanos() / 1_000_000;
        Self { voter_id: vote.voter_id.clone(), cast_at: i64::try_from(millis).unwrap_or(i64::MAX) }
    }
}

impl From<VoteRecord> for Vote {
    fn from(record: VoteRecord) -> Self {
        // An unreadable timestamp falls outside every window and gets pruned.
        let cast_at = OffsetDateTime::from_unix_timestamp_nanos(i128::from(record.cast_at) * 1_000_000)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        Self { voter_id: record.voter_id, cast_at }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct MessageRecord {
    pub(crate) id: Uuid,
    pub(crate) author_id: String,
    pub(crate) text: String,
    pub(crate) lng: f64,
    pub(crate) lat: f64,
    pub(crate) created_at: OffsetDateTime,
    pub(crate) flagged_explicit: bool,
    pub(crate) sampling_key: f64,
    pub(crate) votes: Json<Vec<VoteRecord>>,
    pub(crate) rating: f64,
    pub(crate) revision: i64,
}

impl From<MessageRecord> for Message {
    fn from(record: MessageRecord) -> Self {
        Self {
            id: record.id,
            author_id: record.author_id,
            text: record.text,
            location: GeoPoint::new(record.lng, record.lat),
            created_at: record.created_at,
            flagged_explicit: record.flagged_explicit,
            sampling_key: record.sampling_key,
            votes: record.votes.0.into_iter().map(Into::into).collect(),
            rating: record.rating,
            revision: record.revision,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct FeedItemRecord {
    pub(crate) text: String,
    pub(crate) lng: f64,
    pub(crate) lat: f64,
    pub(crate) rating: f64,
}

impl From<FeedItemRecord> for FeedItem {
    fn from(record: FeedItemRecord) -> Self {
        Self { text: record.text, location: GeoPoint::new(record.lng, record.lat), rating: record.rating }
    }
}
