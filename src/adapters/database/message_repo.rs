use crate::adapters::database::DbPool;
use crate::adapters::database::records::{FeedItemRecord, MessageRecord, VoteRecord};
use crate::adapters::store::{MessageStore, RetainedFields, VoteOutcome, WriteOutcome};
use crate::domain::message::{FeedItem, Message, MessageId, NewMessage, Vote};
use crate::domain::sampling::{KeyBound, Recency, SampleFilter, SortOrder};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

const MESSAGE_COLUMNS: &str =
    "id, author_id, text, lng, lat, created_at, flagged_explicit, sampling_key, votes, rating, revision";

/// Rows per multi-row insert; 7 binds per row stays under the 65535 bind limit.
const INSERT_CHUNK: usize = 1000;

fn limit_param(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

/// Postgres-backed store. Votes live in a JSONB array on the message row, and
/// row-level locking makes each single-statement update atomic.
#[derive(Clone, Debug)]
pub struct PgMessageStore {
    pool: DbPool,
}

impl PgMessageStore {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn exists(&self, id: MessageId) -> Result<bool> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM messages WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }

    async fn missed_write(&self, id: MessageId) -> Result<WriteOutcome> {
        if self.exists(id).await? { Ok(WriteOutcome::Conflict) } else { Ok(WriteOutcome::Missing) }
    }
}

#[async_trait]
impl MessageStore for PgMessageStore {
    #[tracing::instrument(level = "debug", skip(self, message))]
    async fn insert(&self, message: NewMessage) -> Result<MessageId> {
        let id: MessageId = sqlx::query_scalar(
            r#"
            INSERT INTO messages (author_id, text, lng, lat, created_at, flagged_explicit, sampling_key)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(message.author_id)
        .bind(message.text)
        .bind(message.location.lng)
        .bind(message.location.lat)
        .bind(message.created_at)
        .bind(message.flagged_explicit)
        .bind(message.sampling_key)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    #[tracing::instrument(level = "debug", skip(self, messages), fields(batch = messages.len()))]
    async fn insert_many(&self, messages: Vec<NewMessage>) -> Result<Vec<MessageId>> {
        if messages.is_empty() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::with_capacity(messages.len());
        let mut tx = self.pool.begin().await?;
        for chunk in messages.chunks(INSERT_CHUNK) {
            let mut qb = QueryBuilder::<Postgres>::new(
                "INSERT INTO messages (author_id, text, lng, lat, created_at, flagged_explicit, sampling_key) ",
            );
            qb.push_values(chunk, |mut row, message| {
                row.push_bind(message.author_id.clone())
                    .push_bind(message.text.clone())
                    .push_bind(message.location.lng)
                    .push_bind(message.location.lat)
                    .push_bind(message.created_at)
                    .push_bind(message.flagged_explicit)
                    .push_bind(message.sampling_key);
            });
            qb.push(" RETURNING id");

            let inserted: Vec<MessageId> = qb.build_query_scalar().fetch_all(&mut *tx).await?;
            if inserted.len() != chunk.len() {
                return Err(AppError::Store(format!("batch insert returned {} ids for {} rows", inserted.len(), chunk.len())));
            }
            ids.extend(inserted);
        }
        tx.commit().await?;

        Ok(ids)
    }

    #[tracing::instrument(level = "debug", skip(self, filter))]
    async fn find(&self, filter: &SampleFilter, order: SortOrder, limit: usize) -> Result<Vec<FeedItem>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut qb = QueryBuilder::<Postgres>::new("SELECT text, lng, lat, rating FROM messages WHERE lng BETWEEN ");
        qb.push_bind(filter.bbox.min_lng()).push(" AND ").push_bind(filter.bbox.max_lng());
        qb.push(" AND lat BETWEEN ").push_bind(filter.bbox.min_lat()).push(" AND ").push_bind(filter.bbox.max_lat());

        match filter.recency {
            Recency::Fresh { since } => {
                qb.push(" AND created_at > ").push_bind(since);
            }
            Recency::Aged { until } => {
                qb.push(" AND created_at <= ").push_bind(until);
            }
        }

        if filter.exclude_explicit {
            qb.push(" AND NOT flagged_explicit");
        }

        match filter.key {
            KeyBound::AtMost(t) => {
                qb.push(" AND sampling_key <= ").push_bind(t);
            }
            KeyBound::AtLeast(t) => {
                qb.push(" AND sampling_key >= ").push_bind(t);
            }
        }

        qb.push(match order {
            SortOrder::Ascending => " ORDER BY created_at ASC",
            SortOrder::Descending => " ORDER BY created_at DESC",
        });
        qb.push(" LIMIT ").push_bind(limit_param(limit));

        let rows = qb.build_query_as::<FeedItemRecord>().fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn fetch(&self, id: MessageId) -> Result<Option<Message>> {
        let record = sqlx::query_as::<_, MessageRecord>(&format!("SELECT {MESSAGE_COLUMNS} FROM messages WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record.map(Into::into))
    }

    #[tracing::instrument(level = "debug", skip(self, vote), fields(voter_id = %vote.voter_id))]
    async fn append_vote(&self, id: MessageId, vote: Vote) -> Result<VoteOutcome> {
        let record = VoteRecord::from(&vote);
        let probe = serde_json::json!([{ "voterId": record.voter_id }]);

        // The containment check and the append run under the row lock, so two
        // votes from one voter can never both pass.
        let updated = sqlx::query(
            r#"
            UPDATE messages
            SET votes = votes || $2, revision = revision + 1
            WHERE id = $1 AND NOT (votes @> $3)
            "#,
        )
        .bind(id)
        .bind(Json(vec![record]))
        .bind(Json(probe))
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 {
            return Ok(VoteOutcome::Recorded);
        }

        if self.exists(id).await? { Ok(VoteOutcome::Duplicate) } else { Ok(VoteOutcome::NotFound) }
    }

    #[tracing::instrument(level = "debug", skip(self, fields), fields(votes = fields.votes.len()))]
    async fn set_fields(&self, id: MessageId, expected_revision: i64, fields: RetainedFields) -> Result<WriteOutcome> {
        let votes: Vec<VoteRecord> = fields.votes.iter().map(VoteRecord::from).collect();

        let updated = sqlx::query(
            r#"
            UPDATE messages
            SET votes = $3, rating = $4, revision = revision + 1
            WHERE id = $1 AND revision = $2
            "#,
        )
        .bind(id)
        .bind(expected_revision)
        .bind(Json(votes))
        .bind(fields.rating)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() > 0 { Ok(WriteOutcome::Applied) } else { self.missed_write(id).await }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn delete(&self, id: MessageId, expected_revision: i64) -> Result<WriteOutcome> {
        let deleted = sqlx::query("DELETE FROM messages WHERE id = $1 AND revision = $2")
            .bind(id)
            .bind(expected_revision)
            .execute(&self.pool)
            .await?;

        if deleted.rows_affected() > 0 { Ok(WriteOutcome::Applied) } else { self.missed_write(id).await }
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn scan_page(&self, after: Option<MessageId>, limit: usize) -> Result<Vec<Message>> {
        let records = sqlx::query_as::<_, MessageRecord>(&format!(
            "SELECT {MESSAGE_COLUMNS} FROM messages WHERE ($1::uuid IS NULL OR id > $1) ORDER BY id ASC LIMIT $2"
        ))
        .bind(after)
        .bind(limit_param(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }

    async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM messages").fetch_one(&self.pool).await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn purge_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM messages").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
