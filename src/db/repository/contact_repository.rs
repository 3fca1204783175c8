use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::Contact;
use crate::error::EngineResult;

/// Backs the Consent Gate's single query (spec §4.H). Ordering matches the
/// spec exactly: priority ascending, then creation time.
pub struct ContactRepository;

impl ContactRepository {
    pub async fn approved_for_user(
        pool: &SqlitePool,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<Contact>> {
        let rows = sqlx::query_as::<_, Contact>(
            r#"
            SELECT
                id,
                user_id,
                display_name,
                channel,
                address,
                priority,
                consent_status,
                consent_expires_at,
                created_at
            FROM contacts
            WHERE user_id = ?
              AND consent_status = 'approved'
              AND (consent_expires_at IS NULL OR consent_expires_at > ?)
            ORDER BY priority ASC, created_at ASC
            "#,
        )
        .bind(user_id)
        .bind(now)
        .fetch_all(pool)
        .await?;

        Ok(rows)
    }

    /// Used by the worker pool to resolve the delivery address for a claimed
    /// job, which carries only `contact_id` (spec §4.C step 4).
    pub async fn find_by_id(pool: &SqlitePool, contact_id: &str) -> EngineResult<Option<Contact>> {
        let row = sqlx::query_as::<_, Contact>(
            r#"
            SELECT
                id,
                user_id,
                display_name,
                channel,
                address,
                priority,
                consent_status,
                consent_expires_at,
                created_at
            FROM contacts
            WHERE id = ?
            "#,
        )
        .bind(contact_id)
        .fetch_optional(pool)
        .await?;

        Ok(row)
    }
}
