use crate::adapters::store::{MessageStore, RetainedFields, VoteOutcome, WriteOutcome};
use crate::domain::message::{FeedItem, Message, MessageId, NewMessage, Vote};
use crate::domain::sampling::{SampleFilter, SortOrder};
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Process-local store. Each entry is guarded by its shard lock, which makes
/// the vote check-and-append and the revision-checked writes atomic.
#[derive(Clone, Debug, Default)]
pub struct MemoryMessageStore {
    messages: Arc<DashMap<MessageId, Message>>,
}

impl MemoryMessageStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct access to a stored message, bypassing the trait.
    #[must_use]
    pub fn snapshot(&self, id: MessageId) -> Option<Message> {
        self.messages.get(&id).map(|m| m.value().clone())
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn insert(&self, message: NewMessage) -> Result<MessageId> {
        let id = Uuid::now_v7();
        self.messages.insert(id, message.into_message(id));
        Ok(id)
    }

    async fn insert_many(&self, messages: Vec<NewMessage>) -> Result<Vec<MessageId>> {
        let ids = messages
            .into_iter()
            .map(|message| {
                let id = Uuid::now_v7();
                self.messages.insert(id, message.into_message(id));
                id
            })
            .collect();
        Ok(ids)
    }

    async fn find(&self, filter: &SampleFilter, order: SortOrder, limit: usize) -> Result<Vec<FeedItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut matches: Vec<(time::OffsetDateTime, MessageId, FeedItem)> = self
            .messages
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| {
                let m = entry.value();
                (m.created_at, m.id, m.to_feed_item())
            })
            .collect();

        matches.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));
        if order == SortOrder::Descending {
            matches.reverse();
        }

        Ok(matches.into_iter().take(limit).map(|(_, _, item)| item).collect())
    }

    async fn fetch(&self, id: MessageId) -> Result<Option<Message>> {
        Ok(self.snapshot(id))
    }

    async fn append_vote(&self, id: MessageId, vote: Vote) -> Result<VoteOutcome> {
        let Some(mut entry) = self.messages.get_mut(&id) else {
            return Ok(VoteOutcome::NotFound);
        };

        if entry.has_vote_from(&vote.voter_id) {
            return Ok(VoteOutcome::Duplicate);
        }

        entry.votes.push(vote);
        entry.revision += 1;
        Ok(VoteOutcome::Recorded)
    }

    async fn set_fields(&self, id: MessageId, expected_revision: i64, fields: RetainedFields) -> Result<WriteOutcome> {
        let Some(mut entry) = self.messages.get_mut(&id) else {
            return Ok(WriteOutcome::Missing);
        };

        if entry.revision != expected_revision {
            return Ok(WriteOutcome::Conflict);
        }

        entry.votes = fields.votes;
        entry.rating = fields.rating;
        entry.revision += 1;
        Ok(WriteOutcome::Applied)
    }

    async fn delete(&self, id: MessageId, expected_revision: i64) -> Result<WriteOutcome> {
        if self.messages.remove_if(&id, |_, m| m.revision == expected_revision).is_some() {
            return Ok(WriteOutcome::Applied);
        }

        if self.messages.contains_key(&id) { Ok(WriteOutcome::Conflict) } else { Ok(WriteOutcome::Missing) }
    }

    async fn scan_page(&self, after: Option<MessageId>, limit: usize) -> Result<Vec<Message>> {
        let mut page: Vec<Message> = self
            .messages
            .iter()
            .filter(|entry| after.is_none_or(|cursor| *entry.key() > cursor))
            .map(|entry| entry.value().clone())
            .collect();

        page.sort_by_key(|m| m.id);
        page.truncate(limit);
        Ok(page)
    }

    async fn count(&self) -> Result<u64> {
        Ok(self.messages.len() as u64)
    }

    async fn purge_all(&self) -> Result<u64> {
        let removed = self.messages.len() as u64;
        self.messages.clear();
        Ok(removed)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
