use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::User;
use crate::error::EngineResult;

/// Read access to the engine's view of the user table (spec §3: read-only
/// except `last_checkin_at`). Overdue selection itself happens in-memory
/// against `User::is_overdue` so every comparison in one tick shares the
/// scanner's own clock rather than `CURRENT_TIMESTAMP` (spec §5).
pub struct UserRepository;

impl UserRepository {
    pub async fn find_active_with_checkin(pool: &SqlitePool) -> EngineResult<Vec<User>> {
        let rows = sqlx::query_as::<_, User>(
            r#"
            SELECT
                id,
                cycle_days,
                grace_hours,
                last_checkin_at,
                is_active,
                device_push_token,
                location_consent,
                location_consent_at
            FROM users
            WHERE is_active = 1 AND last_checkin_at IS NOT NULL
            "#,
        )
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    pub async fn find_by_id(pool: &SqlitePool, user_id: &str) -> EngineResult<Option<User>> {
        let row = sqlx::query_as::<_, User>(
            r#"
            SELECT
                id,
                cycle_days,
                grace_hours,
                last_checkin_at,
                is_active,
                device_push_token,
                location_consent,
                location_consent_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }

    /// Used by the scenario tests to simulate the out-of-scope API layer
    /// recording a check-in.
    pub async fn record_checkin(
        pool: &SqlitePool,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        sqlx::query("UPDATE users SET last_checkin_at = ? WHERE id = ?")
            .bind(at)
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(())
    }
}
