use sqlx::SqlitePool;

use crate::db::models::ReminderSettingsRow;
use crate::domain::ReminderSettings;
use crate::error::EngineResult;

pub struct ReminderSettingsRepository;

impl ReminderSettingsRepository {
    pub async fn find_by_user(
        pool: &SqlitePool,
        user_id: &str,
    ) -> EngineResult<Option<ReminderSettings>> {
        let row = sqlx::query_as::<_, ReminderSettingsRow>(
            r#"
            SELECT
                user_id,
                hours_before_json,
                quiet_start,
                quiet_end,
                channels_enabled_json,
                custom_prefix
            FROM reminder_settings
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        row.map(ReminderSettings::try_from).transpose()
    }

    pub async fn has_fired(
        pool: &SqlitePool,
        user_id: &str,
        cycle_anchor: chrono::DateTime<chrono::Utc>,
        hours_before: i64,
    ) -> EngineResult<bool> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM reminders_fired WHERE user_id = ? AND cycle_anchor = ? AND hours_before = ?",
        )
        .bind(user_id)
        .bind(cycle_anchor)
        .bind(hours_before)
        .fetch_one(pool)
        .await?;

        Ok(count > 0)
    }

    /// Records the fired tuple. A unique-constraint violation here means a
    /// concurrent scheduler tick (or a second engine instance) already
    /// recorded it — treated as success, mirroring the Ledger's policy
    /// (spec §5).
    pub async fn record_fired(
        pool: &SqlitePool,
        user_id: &str,
        cycle_anchor: chrono::DateTime<chrono::Utc>,
        hours_before: i64,
        fired_at: chrono::DateTime<chrono::Utc>,
    ) -> EngineResult<bool> {
        let result = sqlx::query(
            "INSERT INTO reminders_fired (user_id, cycle_anchor, hours_before, fired_at) VALUES (?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(cycle_anchor)
        .bind(hours_before)
        .bind(fired_at)
        .execute(pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
