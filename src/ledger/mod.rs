//! Idempotency Ledger (spec §4.I): the single source of truth for "has this
//! been sent?" A unique-index violation on insert is treated as success
//! (spec §5's shared-resource policy) rather than an error, since it means
//! another worker already recorded the same delivery first.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::domain::{Channel, Outcome};
use crate::error::EngineResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub episode_id: String,
    pub contact_id: String,
    pub channel: Channel,
}

#[async_trait]
pub trait IdempotencyLedger: Send + Sync + 'static {
    async fn check(&self, key: &LedgerKey) -> EngineResult<Option<Outcome>>;

    /// Records a terminal outcome. Returns `true` if this call recorded it,
    /// `false` if another writer already had (both are success, spec §5).
    async fn record(
        &self,
        key: &LedgerKey,
        outcome: Outcome,
        provider_msg_id: Option<String>,
    ) -> EngineResult<bool>;
}

pub struct SqliteLedger {
    pool: SqlitePool,
}

impl SqliteLedger {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyLedger for SqliteLedger {
    async fn check(&self, key: &LedgerKey) -> EngineResult<Option<Outcome>> {
        let outcome: Option<Outcome> = sqlx::query_scalar(
            "SELECT outcome FROM idempotency WHERE episode_id = ? AND contact_id = ? AND channel = ?",
        )
        .bind(&key.episode_id)
        .bind(&key.contact_id)
        .bind(key.channel)
        .fetch_optional(&self.pool)
        .await?;

        Ok(outcome)
    }

    async fn record(
        &self,
        key: &LedgerKey,
        outcome: Outcome,
        provider_msg_id: Option<String>,
    ) -> EngineResult<bool> {
        let result = sqlx::query(
            "INSERT INTO idempotency (episode_id, contact_id, channel, outcome, recorded_at, provider_msg_id) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&key.episode_id)
        .bind(&key.contact_id)
        .bind(key.channel)
        .bind(outcome)
        .bind(Utc::now())
        .bind(provider_msg_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(true),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ledger_key_equality_ignores_field_order() {
        let a = LedgerKey {
            episode_id: "ep1".into(),
            contact_id: "c1".into(),
            channel: Channel::Email,
        };
        let b = a.clone();
        assert_eq!(a, b);
    }
}
