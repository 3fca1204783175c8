use chrono::NaiveTime;

use crate::domain::{ReminderChannel, ReminderSettings};
use crate::error::{EngineError, EngineResult};

/// `reminder_settings` row. `hours_before` and `channels_enabled` are stored
/// as JSON text columns since sqlx has no native array type for SQLite.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ReminderSettingsRow {
    pub user_id: String,
    pub hours_before_json: String,
    pub quiet_start: Option<NaiveTime>,
    pub quiet_end: Option<NaiveTime>,
    pub channels_enabled_json: String,
    pub custom_prefix: Option<String>,
}

impl TryFrom<ReminderSettingsRow> for ReminderSettings {
    type Error = EngineError;

    fn try_from(row: ReminderSettingsRow) -> EngineResult<Self> {
        let hours_before: Vec<i64> = serde_json::from_str(&row.hours_before_json)
            .map_err(|e| EngineError::Invariant(format!("malformed hours_before json: {e}")))?;
        let channels_enabled: Vec<ReminderChannel> = serde_json::from_str(&row.channels_enabled_json)
            .map_err(|e| EngineError::Invariant(format!("malformed channels_enabled json: {e}")))?;

        Ok(ReminderSettings {
            user_id: row.user_id,
            hours_before,
            quiet_start: row.quiet_start,
            quiet_end: row.quiet_end,
            channels_enabled,
            custom_prefix: row.custom_prefix,
        })
    }
}

pub fn encode_hours_before(hours: &[i64]) -> String {
    serde_json::to_string(hours).unwrap_or_else(|_| "[]".to_string())
}

pub fn encode_channels(channels: &[ReminderChannel]) -> String {
    serde_json::to_string(channels).unwrap_or_else(|_| "[]".to_string())
}
