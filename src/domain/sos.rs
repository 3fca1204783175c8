use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum SosState {
    Countdown,
    Cancelled,
    Dispatching,
    Sent,
}

impl SosState {
    /// Spec §3 invariant I5: countdown is cancellable, dispatching/sent are not.
    pub fn is_cancellable(self) -> bool {
        matches!(self, SosState::Countdown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

/// In-memory SOS state (spec §3, §4.G), mirrored to a durable row on every
/// transition for crash recovery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SosEvent {
    pub id: String,
    pub user_id: String,
    pub triggered_at: DateTime<Utc>,
    pub state: SosState,
    pub location: Option<GeoPoint>,
    pub countdown_deadline: DateTime<Utc>,
}
