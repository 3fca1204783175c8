//! Job Queue (spec §4.D): a durable, relational FIFO-per-episode queue with
//! at-least-once delivery, visibility timeout, and delayed enqueue. Claims
//! use a single atomic `UPDATE ... WHERE id = (SELECT id ... LIMIT 1)
//! RETURNING` statement against the `dispatch_jobs` table and its explicit
//! state machine (invariant I3), so two workers racing the same claim never
//! both win.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::domain::{Channel, DispatchJob};
use crate::error::EngineResult;

/// A freshly claimed job, carrying the claim token a worker must present to
/// extend, acknowledge, or negative-acknowledge it.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: DispatchJob,
    pub claim_token: String,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub episode_id: String,
    pub contact_id: String,
    pub channel: Channel,
    pub attempt: i32,
    pub not_before: DateTime<Utc>,
    pub is_sos: bool,
    pub is_reminder: bool,
}

/// Durable queue contract (spec §4.D). Implementations must survive process
/// restart; claims are leased, not owned, so a crashed worker's jobs return
/// to `queued` once the visibility timeout elapses.
#[async_trait]
pub trait JobQueue: Send + Sync + 'static {
    async fn enqueue(&self, job: NewJob) -> EngineResult<DispatchJob>;

    /// Claim up to `limit` ready jobs (`state = queued`, `not_before <= now`),
    /// marking them `in-flight` with a `now + visibility_timeout` lease.
    async fn claim_ready(
        &self,
        now: DateTime<Utc>,
        visibility_timeout: chrono::Duration,
        limit: i64,
    ) -> EngineResult<Vec<ClaimedJob>>;

    async fn extend_visibility(
        &self,
        claim: &ClaimedJob,
        extra: chrono::Duration,
    ) -> EngineResult<()>;

    async fn acknowledge_delivered(&self, claim: &ClaimedJob) -> EngineResult<()>;

    async fn acknowledge_dead(&self, claim: &ClaimedJob, error: Option<String>) -> EngineResult<()>;

    /// Ends the current attempt as `failed` and enqueues the retry as a new
    /// row (spec §3: jobs are created "at episode open and at retry time").
    async fn retry(
        &self,
        claim: &ClaimedJob,
        next_not_before: DateTime<Utc>,
        error: Option<String>,
    ) -> EngineResult<DispatchJob>;

    /// Transitions every `queued` job of an episode straight to `dead`
    /// (spec §4.E cancellation semantics).
    async fn cancel_queued_for_episode(&self, episode_id: &str) -> EngineResult<u64>;

    /// Returns expired in-flight jobs to `queued` (spec §4.D's periodic
    /// sweeper).
    async fn sweep_expired_claims(&self, now: DateTime<Utc>) -> EngineResult<u64>;
}

pub struct SqliteJobQueue {
    pool: SqlitePool,
}

impl SqliteJobQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(&self, job: NewJob) -> EngineResult<DispatchJob> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        let row = sqlx::query_as::<_, DispatchJob>(
            r#"
            INSERT INTO dispatch_jobs (
                id, episode_id, contact_id, channel, attempt, not_before,
                state, last_error, is_sos, is_reminder, claimed_by, claim_expires_at,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, 'queued', NULL, ?, ?, NULL, NULL, ?, ?)
            RETURNING id, episode_id, contact_id, channel, attempt, not_before, state, last_error, is_sos, is_reminder
            "#,
        )
        .bind(&id)
        .bind(&job.episode_id)
        .bind(&job.contact_id)
        .bind(job.channel)
        .bind(job.attempt)
        .bind(job.not_before)
        .bind(job.is_sos)
        .bind(job.is_reminder)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        Ok(row)
    }

    async fn claim_ready(
        &self,
        now: DateTime<Utc>,
        visibility_timeout: chrono::Duration,
        limit: i64,
    ) -> EngineResult<Vec<ClaimedJob>> {
        let mut claimed = Vec::new();
        if limit <= 0 {
            return Ok(claimed);
        }

        let lease_expires = now + visibility_timeout;
        let claim_token = Uuid::new_v4().to_string();

        for _ in 0..limit {
            let row = sqlx::query_as::<_, DispatchJob>(
                r#"
                UPDATE dispatch_jobs
                SET state = 'in-flight', claimed_by = ?, claim_expires_at = ?, updated_at = ?
                WHERE id = (
                    SELECT id FROM dispatch_jobs
                    WHERE state = 'queued' AND not_before <= ?
                    ORDER BY not_before ASC
                    LIMIT 1
                )
                RETURNING id, episode_id, contact_id, channel, attempt, not_before, state, last_error, is_sos, is_reminder
                "#,
            )
            .bind(&claim_token)
            .bind(lease_expires)
            .bind(now)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

            match row {
                Some(job) => claimed.push(ClaimedJob {
                    job,
                    claim_token: claim_token.clone(),
                }),
                None => break,
            }
        }

        Ok(claimed)
    }

    async fn extend_visibility(
        &self,
        claim: &ClaimedJob,
        extra: chrono::Duration,
    ) -> EngineResult<()> {
        let new_expiry: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT claim_expires_at FROM dispatch_jobs WHERE id = ? AND claimed_by = ?",
        )
        .bind(&claim.job.id)
        .bind(&claim.claim_token)
        .fetch_optional(&self.pool)
        .await?
        .flatten()
        .map(|current: DateTime<Utc>| current + extra);

        if let Some(expiry) = new_expiry {
            sqlx::query(
                "UPDATE dispatch_jobs SET claim_expires_at = ? WHERE id = ? AND claimed_by = ?",
            )
            .bind(expiry)
            .bind(&claim.job.id)
            .bind(&claim.claim_token)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn acknowledge_delivered(&self, claim: &ClaimedJob) -> EngineResult<()> {
        sqlx::query(
            "UPDATE dispatch_jobs SET state = 'delivered', updated_at = ? WHERE id = ? AND claimed_by = ?",
        )
        .bind(Utc::now())
        .bind(&claim.job.id)
        .bind(&claim.claim_token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn acknowledge_dead(&self, claim: &ClaimedJob, error: Option<String>) -> EngineResult<()> {
        sqlx::query(
            "UPDATE dispatch_jobs SET state = 'dead', last_error = ?, updated_at = ? WHERE id = ? AND claimed_by = ?",
        )
        .bind(error)
        .bind(Utc::now())
        .bind(&claim.job.id)
        .bind(&claim.claim_token)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn retry(
        &self,
        claim: &ClaimedJob,
        next_not_before: DateTime<Utc>,
        error: Option<String>,
    ) -> EngineResult<DispatchJob> {
        let now = Utc::now();

        sqlx::query(
            "UPDATE dispatch_jobs SET state = 'failed', last_error = ?, updated_at = ? WHERE id = ? AND claimed_by = ?",
        )
        .bind(&error)
        .bind(now)
        .bind(&claim.job.id)
        .bind(&claim.claim_token)
        .execute(&self.pool)
        .await?;

        let retry_job = NewJob {
            episode_id: claim.job.episode_id.clone(),
            contact_id: claim.job.contact_id.clone(),
            channel: claim.job.channel,
            attempt: claim.job.attempt + 1,
            not_before: next_not_before,
            is_sos: claim.job.is_sos,
            is_reminder: claim.job.is_reminder,
        };

        self.enqueue(retry_job).await
    }

    async fn cancel_queued_for_episode(&self, episode_id: &str) -> EngineResult<u64> {
        let result = sqlx::query(
            "UPDATE dispatch_jobs SET state = 'dead', updated_at = ? WHERE episode_id = ? AND state = 'queued'",
        )
        .bind(Utc::now())
        .bind(episode_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn sweep_expired_claims(&self, now: DateTime<Utc>) -> EngineResult<u64> {
        let result = sqlx::query(
            "UPDATE dispatch_jobs SET state = 'queued', claimed_by = NULL, claim_expires_at = NULL, updated_at = ? \
             WHERE state = 'in-flight' AND claim_expires_at <= ?",
        )
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
