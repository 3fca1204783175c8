use sqlx::SqlitePool;

use crate::domain::DeliveryLogEntry;
use crate::error::EngineResult;

pub struct DeliveryLogRepository;

impl DeliveryLogRepository {
    pub async fn record(pool: &SqlitePool, entry: &DeliveryLogEntry) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO delivery_log (episode_id, contact_id, channel, attempt, outcome, provider_msg_id, recorded_at, sanitized_error) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.episode_id)
        .bind(&entry.contact_id)
        .bind(entry.channel)
        .bind(entry.attempt)
        .bind(entry.outcome)
        .bind(&entry.provider_msg_id)
        .bind(entry.recorded_at)
        .bind(&entry.sanitized_error)
        .execute(pool)
        .await?;

        Ok(())
    }

    #[cfg(any(test, feature = "test-support"))]
    pub async fn count_for_episode(pool: &SqlitePool, episode_id: &str) -> EngineResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM delivery_log WHERE episode_id = ?")
            .bind(episode_id)
            .fetch_one(pool)
            .await?;
        Ok(count)
    }
}
