use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::contact::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
pub enum Outcome {
    Sent,
    ProviderReject,
    TransientFail,
    InvalidAddress,
    SkippedDuplicate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeliveryLogEntry {
    pub episode_id: String,
    pub contact_id: String,
    pub channel: Channel,
    pub attempt: i32,
    pub outcome: Outcome,
    pub provider_msg_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub sanitized_error: Option<String>,
}
