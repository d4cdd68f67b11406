#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, clippy::must_use_candidate, missing_debug_implementations, unreachable_pub, clippy::float_cmp)]
use async_trait::async_trait;
use common::{seed_message, seed_votes};
use geofeed_server::adapters::store::{MemoryMessageStore, MessageStore, RetainedFields, VoteOutcome, WriteOutcome};
use geofeed_server::config::RetentionConfig;
use geofeed_server::domain::message::{FeedItem, GeoPoint, Message, MessageId, NewMessage, Vote};
use geofeed_server::domain::sampling::{SampleFilter, SortOrder};
use geofeed_server::error::{AppError, Result};
use geofeed_server::workers::RetentionWorker;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use time::{Duration, OffsetDateTime};
use tokio::sync::watch;
mod common;

fn worker(store: Arc<dyn MessageStore>) -> RetentionWorker {
    RetentionWorker::new(store, &RetentionConfig::default())
}

async fn aged(store: &MemoryMessageStore, age: Duration) -> MessageId {
    seed_message(store, "msg", GeoPoint::new(0.0, 0.0), age, false, 0.5).await
}

#[tokio::test]
async fn test_sweep_evicts_messages_below_quota() {
    let store = MemoryMessageStore::new();
    let id = aged(&store, Duration::hours(2)).await;
    seed_votes(&store, id, 9, Duration::minutes(5), "v").await;

    let (_tx, rx) = watch::channel(false);
    let report = worker(Arc::new(store.clone())).sweep(&rx).await.unwrap();

    assert_eq!(report.evicted, 1);
    assert!(store.snapshot(id).is_none());
}

#[tokio::test]
async fn test_sweep_rerates_survivors() {
    let store = MemoryMessageStore::new();
    let id = aged(&store, Duration::hours(2)).await;
    seed_votes(&store, id, 20, Duration::minutes(5), "v").await;

    let (_tx, rx) = watch::channel(false);
    let report = worker(Arc::new(store.clone())).sweep(&rx).await.unwrap();

    assert_eq!(report.retained, 1);
    let kept = store.snapshot(id).unwrap();
    assert_eq!(kept.votes.len(), 20);
    assert_eq!(kept.rating, 10.0);
}

#[tokio::test]
async fn test_sweep_leaves_young_messages_alone() {
    let store = MemoryMessageStore::new();
    let id = aged(&store, Duration::minutes(30)).await;

    let (_tx, rx) = watch::channel(false);
    let report = worker(Arc::new(store.clone())).sweep(&rx).await.unwrap();

    assert_eq!(report.exempt, 1);
    assert_eq!(report.evicted, 0);
    let kept = store.snapshot(id).unwrap();
    assert!(kept.votes.is_empty());
    assert_eq!(kept.rating, 1.0);
}

#[tokio::test]
async fn test_sweep_prunes_votes_outside_window() {
    let store = MemoryMessageStore::new();
    let id = aged(&store, Duration::minutes(90)).await;
    // quota at 90 minutes is 7.5 votes, counted over the last hour
    seed_votes(&store, id, 12, Duration::minutes(10), "recent").await;
    seed_votes(&store, id, 4, Duration::minutes(80), "stale").await;

    let (_tx, rx) = watch::channel(false);
    let report = worker(Arc::new(store.clone())).sweep(&rx).await.unwrap();

    assert_eq!(report.votes_pruned, 4);
    let kept = store.snapshot(id).unwrap();
    assert_eq!(kept.votes.len(), 12);
    assert!(kept.votes.iter().all(|v| v.voter_id.starts_with("recent")));
    assert!(kept.rating > 1.0);
}

#[tokio::test]
async fn test_sweep_pages_through_whole_store() {
    let store = MemoryMessageStore::new();
    for _ in 0..7 {
        aged(&store, Duration::hours(3)).await;
    }
    let config = RetentionConfig { scan_batch_size: 2, ..RetentionConfig::default() };
    let worker = RetentionWorker::new(Arc::new(store.clone()), &config);

    let (_tx, rx) = watch::channel(false);
    let report = worker.sweep(&rx).await.unwrap();

    assert_eq!(report.scanned, 7);
    assert_eq!(report.evicted, 7);
    assert_eq!(store.count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_sweep_stops_on_shutdown() {
    let store = MemoryMessageStore::new();
    aged(&store, Duration::hours(3)).await;

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let report = worker(Arc::new(store.clone())).sweep(&rx).await.unwrap();

    assert!(report.abandoned);
    assert_eq!(report.scanned, 0);
    assert_eq!(store.count().await.unwrap(), 1);
}

/// Delegates to a memory store, with two injectable faults: writes to the
/// `poisoned` message fail, and while `late_vote` is armed the next delete
/// first slips in a fresh vote so the sweep's read goes stale.
#[derive(Debug)]
struct FaultyStore {
    inner: MemoryMessageStore,
    poisoned: Option<MessageId>,
    late_vote: AtomicBool,
}

impl FaultyStore {
    fn check(&self, id: MessageId) -> Result<()> {
        if self.poisoned == Some(id) {
            return Err(AppError::Store("disk on fire".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageStore for FaultyStore {
    async fn insert(&self, message: NewMessage) -> Result<MessageId> {
        self.inner.insert(message).await
    }

    async fn insert_many(&self, messages: Vec<NewMessage>) -> Result<Vec<MessageId>> {
        self.inner.insert_many(messages).await
    }

    async fn find(&self, filter: &SampleFilter, order: SortOrder, limit: usize) -> Result<Vec<FeedItem>> {
        self.inner.find(filter, order, limit).await
    }

    async fn fetch(&self, id: MessageId) -> Result<Option<Message>> {
        self.inner.fetch(id).await
    }

    async fn append_vote(&self, id: MessageId, vote: Vote) -> Result<VoteOutcome> {
        self.inner.append_vote(id, vote).await
    }

    async fn set_fields(&self, id: MessageId, expected_revision: i64, fields: RetainedFields) -> Result<WriteOutcome> {
        self.check(id)?;
        self.inner.set_fields(id, expected_revision, fields).await
    }

    async fn delete(&self, id: MessageId, expected_revision: i64) -> Result<WriteOutcome> {
        self.check(id)?;
        if self.late_vote.swap(false, Ordering::SeqCst) {
            self.inner.append_vote(id, Vote::new("late-voter", OffsetDateTime::now_utc())).await?;
        }
        self.inner.delete(id, expected_revision).await
    }

    async fn scan_page(&self, after: Option<MessageId>, limit: usize) -> Result<Vec<Message>> {
        self.inner.scan_page(after, limit).await
    }

    async fn count(&self) -> Result<u64> {
        self.inner.count().await
    }

    async fn purge_all(&self) -> Result<u64> {
        self.inner.purge_all().await
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }
}

#[tokio::test]
async fn test_one_failing_message_does_not_stop_the_sweep() {
    let inner = MemoryMessageStore::new();
    let bad = aged(&inner, Duration::hours(3)).await;
    let mut good = Vec::new();
    for _ in 0..3 {
        good.push(aged(&inner, Duration::hours(3)).await);
    }

    let store = FaultyStore { inner: inner.clone(), poisoned: Some(bad), late_vote: AtomicBool::new(false) };
    let (_tx, rx) = watch::channel(false);
    let report = worker(Arc::new(store)).sweep(&rx).await.unwrap();

    assert_eq!(report.failed, 1);
    assert_eq!(report.evicted, 3);
    assert!(inner.snapshot(bad).is_some());
    assert!(good.iter().all(|id| inner.snapshot(*id).is_none()));
}

#[tokio::test]
async fn test_vote_landing_mid_sweep_is_not_lost() {
    let inner = MemoryMessageStore::new();
    let id = aged(&inner, Duration::minutes(90)).await;
    // 7 votes misses the 7.5 quota; the late vote lifts it to 8
    seed_votes(&inner, id, 7, Duration::minutes(5), "v").await;

    let store = FaultyStore { inner: inner.clone(), poisoned: None, late_vote: AtomicBool::new(true) };
    let (_tx, rx) = watch::channel(false);
    let report = worker(Arc::new(store)).sweep(&rx).await.unwrap();

    assert_eq!(report.evicted, 0);
    let kept = inner.snapshot(id).unwrap();
    assert_eq!(kept.votes.len(), 8);
    assert!(kept.has_vote_from("late-voter"));
}

#[tokio::test]
async fn test_worker_loop_exits_on_shutdown() {
    let store = MemoryMessageStore::new();
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(worker(Arc::new(store)).run(rx));

    tx.send(true).unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(5), handle).await.unwrap().unwrap();
}

#[tokio::test]
async fn test_votes_from_one_voter_are_unique_after_sweep() {
    let store = MemoryMessageStore::new();
    let id = aged(&store, Duration::hours(2)).await;
    seed_votes(&store, id, 15, Duration::minutes(1), "v").await;
    assert_eq!(
        store.append_vote(id, Vote::new("v-0", OffsetDateTime::now_utc())).await.unwrap(),
        VoteOutcome::Duplicate
    );

    let (_tx, rx) = watch::channel(false);
    worker(Arc::new(store.clone())).sweep(&rx).await.unwrap();

    let kept = store.snapshot(id).unwrap();
    let mut voters: Vec<_> = kept.votes.iter().map(|v| v.voter_id.clone()).collect();
    voters.sort();
    voters.dedup();
    assert_eq!(voters.len(), kept.votes.len());
}
