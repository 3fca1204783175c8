use sqlx::SqlitePool;

use crate::domain::GeoPoint;
use crate::error::{EngineError, EngineResult};
use crate::render::{PetContext, VaultEntryContext};

/// Side-payloads resolved once when an episode opens (spec §4.E step 5),
/// read back by the worker for every job belonging to the episode.
#[derive(Debug, Clone, Default)]
pub struct EpisodeAlertContext {
    pub personal_message: Option<String>,
    pub pets: Vec<PetContext>,
    pub vault_entries: Vec<VaultEntryContext>,
    pub location: Option<GeoPoint>,
}

pub struct EpisodeContextRepository;

impl EpisodeContextRepository {
    pub async fn save(
        pool: &SqlitePool,
        episode_id: &str,
        ctx: &EpisodeAlertContext,
    ) -> EngineResult<()> {
        let pets_json = serde_json::to_string(&ctx.pets)
            .map_err(|e| EngineError::Invariant(format!("failed to serialize pets: {e}")))?;
        let vault_json = serde_json::to_string(&ctx.vault_entries)
            .map_err(|e| EngineError::Invariant(format!("failed to serialize vault entries: {e}")))?;

        sqlx::query(
            "INSERT INTO episode_alert_context (episode_id, personal_message, pets_json, vault_json, lat, lng) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(episode_id)
        .bind(&ctx.personal_message)
        .bind(pets_json)
        .bind(vault_json)
        .bind(ctx.location.map(|l| l.lat))
        .bind(ctx.location.map(|l| l.lng))
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn load(pool: &SqlitePool, episode_id: &str) -> EngineResult<EpisodeAlertContext> {
        let row: Option<(Option<String>, String, String, Option<f64>, Option<f64>)> = sqlx::query_as(
            "SELECT personal_message, pets_json, vault_json, lat, lng FROM episode_alert_context WHERE episode_id = ?",
        )
        .bind(episode_id)
        .fetch_optional(pool)
        .await?;

        let Some((personal_message, pets_json, vault_json, lat, lng)) = row else {
            return Ok(EpisodeAlertContext::default());
        };

        let pets: Vec<PetContext> = serde_json::from_str(&pets_json)
            .map_err(|e| EngineError::Invariant(format!("malformed pets json: {e}")))?;
        let vault_entries: Vec<VaultEntryContext> = serde_json::from_str(&vault_json)
            .map_err(|e| EngineError::Invariant(format!("malformed vault json: {e}")))?;

        Ok(EpisodeAlertContext {
            personal_message,
            pets,
            vault_entries,
            location: match (lat, lng) {
                (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
                _ => None,
            },
        })
    }
}
