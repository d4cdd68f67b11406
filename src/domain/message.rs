use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

pub type MessageId = Uuid;

/// Rating every message starts with, and the floor of the retention table.
pub const INITIAL_RATING: f64 = 1.0;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lng: f64,
    pub lat: f64,
}

impl GeoPoint {
    #[must_use]
    pub const fn new(lng: f64, lat: f64) -> Self {
        Self { lng, lat }
    }

    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.lng.is_finite() && self.lat.is_finite()
    }
}

/// A map viewport described by its north-west and south-east corners.
///
/// `nw` must have the smaller longitude and the larger latitude. Corners that
/// are inverted or not finite do not form a box, so no message can match them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    nw: GeoPoint,
    se: GeoPoint,
}

impl BoundingBox {
    #[must_use]
    pub fn new(nw: GeoPoint, se: GeoPoint) -> Option<Self> {
        if !nw.is_finite() || !se.is_finite() {
            return None;
        }
        if nw.lng > se.lng || nw.lat < se.lat {
            return None;
        }
        Some(Self { nw, se })
    }

    #[must_use]
    pub const fn min_lng(&self) -> f64 {
        self.nw.lng
    }

    #[must_use]
    pub const fn max_lng(&self) -> f64 {
        self.se.lng
    }

    #[must_use]
    pub const fn min_lat(&self) -> f64 {
        self.se.lat
    }

    #[must_use]
    pub const fn max_lat(&self) -> f64 {
        self.nw.lat
    }

    /// Edges are inclusive. Non-finite points never match.
    #[must_use]
    pub fn contains(&self, point: GeoPoint) -> bool {
        point.is_finite()
            && (self.min_lng()..=self.max_lng()).contains(&point.lng)
            && (self.min_lat()..=self.max_lat()).contains(&point.lat)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Vote {
    pub voter_id: String,
    pub cast_at: OffsetDateTime,
}

impl Vote {
    #[must_use]
    pub fn new(voter_id: impl Into<String>, cast_at: OffsetDateTime) -> Self {
        Self { voter_id: voter_id.into(), cast_at }
    }
}

/// A message as held by the store, bookkeeping included.
///
/// `revision` increases with every write to `votes` or `rating` and backs the
/// compare-and-swap writes of the retention sweep.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    pub id: MessageId,
    pub author_id: String,
    pub text: String,
    pub location: GeoPoint,
    pub created_at: OffsetDateTime,
    pub flagged_explicit: bool,
    pub sampling_key: f64,
    pub votes: Vec<Vote>,
    pub rating: f64,
    pub revision: i64,
}

impl Message {
    #[must_use]
    pub fn has_vote_from(&self, voter_id: &str) -> bool {
        self.votes.iter().any(|v| v.voter_id == voter_id)
    }

    #[must_use]
    pub fn age_at(&self, now: OffsetDateTime) -> Duration {
        now - self.created_at
    }

    #[must_use]
    pub fn to_feed_item(&self) -> FeedItem {
        FeedItem { text: self.text.clone(), location: self.location, rating: self.rating }
    }
}

/// Everything written at insertion. The store assigns the id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewMessage {
    pub author_id: String,
    pub text: String,
    pub location: GeoPoint,
    pub created_at: OffsetDateTime,
    pub flagged_explicit: bool,
    pub sampling_key: f64,
}

impl NewMessage {
    #[must_use]
    pub fn into_message(self, id: MessageId) -> Message {
        Message {
            id,
            author_id: self.author_id,
            text: self.text,
            location: self.location,
            created_at: self.created_at,
            flagged_explicit: self.flagged_explicit,
            sampling_key: self.sampling_key,
            votes: Vec::new(),
            rating: INITIAL_RATING,
            revision: 0,
        }
    }
}

/// The client-visible projection of a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub text: String,
    pub location: GeoPoint,
    pub rating: f64,
}

/// Truncates to millisecond resolution, the precision timestamps are kept at.
#[must_use]
pub fn now_millis() -> OffsetDateTime {
    let now = OffsetDateTime::now_utc();
    now.replace_millisecond(now.millisecond()).unwrap_or(now)
}
