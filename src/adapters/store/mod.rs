use crate::domain::message::{FeedItem, Message, MessageId, NewMessage, Vote};
use crate::domain::sampling::{SampleFilter, SortOrder};
use crate::error::Result;
use async_trait::async_trait;

pub mod memory;

pub use memory::MemoryMessageStore;

/// Result of a conditional vote append.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteOutcome {
    Recorded,
    Duplicate,
    NotFound,
}

impl VoteOutcome {
    #[must_use]
    pub const fn is_recorded(self) -> bool {
        matches!(self, Self::Recorded)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Recorded => "recorded",
            Self::Duplicate => "duplicate",
            Self::NotFound => "notFound",
        }
    }
}

/// Result of a revision-checked write.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// The message changed since it was read.
    Conflict,
    /// The message no longer exists.
    Missing,
}

/// Fields the retention sweep rewrites on a surviving message.
#[derive(Clone, Debug, PartialEq)]
pub struct RetainedFields {
    pub votes: Vec<Vote>,
    pub rating: f64,
}

/// A geo-indexed, randomly keyed message collection.
///
/// `append_vote` must be atomic per message: the duplicate check and the
/// append happen as one step. Every write to `votes` or `rating` bumps the
/// message revision, and `set_fields`/`delete` only apply when the caller's
/// revision is still current.
#[async_trait]
pub trait MessageStore: Send + Sync + std::fmt::Debug + 'static {
    /// Stores a new message with an empty vote list and the initial rating.
    async fn insert(&self, message: NewMessage) -> Result<MessageId>;

    /// Stores a batch, all or nothing where the backend allows it.
    async fn insert_many(&self, messages: Vec<NewMessage>) -> Result<Vec<MessageId>>;

    /// Up to `limit` matches of `filter`, ordered by creation time.
    async fn find(&self, filter: &SampleFilter, order: SortOrder, limit: usize) -> Result<Vec<FeedItem>>;

    async fn fetch(&self, id: MessageId) -> Result<Option<Message>>;

    /// Appends `vote` unless the message already holds a vote from the same voter.
    async fn append_vote(&self, id: MessageId, vote: Vote) -> Result<VoteOutcome>;

    async fn set_fields(&self, id: MessageId, expected_revision: i64, fields: RetainedFields) -> Result<WriteOutcome>;

    async fn delete(&self, id: MessageId, expected_revision: i64) -> Result<WriteOutcome>;

    /// Up to `limit` messages with an id greater than `after`, in id order.
    async fn scan_page(&self, after: Option<MessageId>, limit: usize) -> Result<Vec<Message>>;

    async fn count(&self) -> Result<u64>;

    /// Deletes every message and returns how many were removed.
    async fn purge_all(&self) -> Result<u64>;

    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<()>;
}
