use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::{AlertEpisode, EpisodeKind, EpisodeResolution};
use crate::error::EngineResult;

pub struct EpisodeRepository;

impl EpisodeRepository {
    /// Conditional insert keyed by the deterministic episode id (invariant
    /// I1). Returns `true` if this call created the row, `false` if it
    /// already existed — the scanner's "idempotency pin" (spec §4.E step 3).
    pub async fn create_if_absent(
        pool: &SqlitePool,
        id: &str,
        user_id: &str,
        kind: EpisodeKind,
        opened_at: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let result = sqlx::query(
            "INSERT INTO alert_episodes (id, user_id, kind, opened_at, closed_at, resolution) \
             VALUES (?, ?, ?, ?, NULL, NULL)",
        )
        .bind(id)
        .bind(user_id)
        .bind(kind)
        .bind(opened_at)
        .execute(pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Open missed-check-in episodes, polled once per scanner tick so a late
    /// check-in racing a prior tick's episode-open is still caught (spec §8
    /// "late check-in cancels"). SOS episodes are excluded: there is no
    /// analogous "user checked in" cancellation for them (spec §4.G).
    pub async fn find_open_missed_checkin(pool: &SqlitePool) -> EngineResult<Vec<AlertEpisode>> {
        let rows = sqlx::query_as::<_, AlertEpisode>(
            "SELECT id, user_id, kind, opened_at, closed_at, resolution FROM alert_episodes \
             WHERE closed_at IS NULL AND kind = 'missed-checkin'",
        )
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: &str) -> EngineResult<Option<AlertEpisode>> {
        let row = sqlx::query_as::<_, AlertEpisode>(
            "SELECT id, user_id, kind, opened_at, closed_at, resolution FROM alert_episodes WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Closes the episode exactly once (invariant I4): the `closed_at IS NULL`
    /// guard means a racing second close attempt is a no-op.
    pub async fn close(
        pool: &SqlitePool,
        id: &str,
        resolution: EpisodeResolution,
        closed_at: DateTime<Utc>,
    ) -> EngineResult<bool> {
        let result = sqlx::query(
            "UPDATE alert_episodes SET closed_at = ?, resolution = ? WHERE id = ? AND closed_at IS NULL",
        )
        .bind(closed_at)
        .bind(resolution)
        .bind(id)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Every `(contact_id, channel)` pair enqueued for this episode has
    /// reached a terminal job state — used by the worker pool to decide
    /// episode closure (spec §4.C, final paragraph).
    pub async fn all_jobs_terminal(pool: &SqlitePool, episode_id: &str) -> EngineResult<bool> {
        let open: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM dispatch_jobs WHERE episode_id = ? AND state IN ('queued', 'in-flight')",
        )
        .bind(episode_id)
        .fetch_one(pool)
        .await?;

        Ok(open == 0)
    }
}
