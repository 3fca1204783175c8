use chrono::{DateTime, Utc};

use crate::domain::{GeoPoint, SosEvent, SosState};

/// `sos_events` row — the durable mirror the coordinator replays from on
/// restart (spec §4.G). `lat`/`lng` are nullable columns rather than a
/// nested struct so the row can derive `FromRow` directly.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SosEventRow {
    pub id: String,
    pub user_id: String,
    pub triggered_at: DateTime<Utc>,
    pub state: SosState,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub countdown_deadline: DateTime<Utc>,
}

impl From<SosEventRow> for SosEvent {
    fn from(row: SosEventRow) -> Self {
        SosEvent {
            id: row.id,
            user_id: row.user_id,
            triggered_at: row.triggered_at,
            state: row.state,
            location: match (row.lat, row.lng) {
                (Some(lat), Some(lng)) => Some(GeoPoint { lat, lng }),
                _ => None,
            },
            countdown_deadline: row.countdown_deadline,
        }
    }
}

impl SosEventRow {
    pub fn from_event(event: &SosEvent) -> Self {
        Self {
            id: event.id.clone(),
            user_id: event.user_id.clone(),
            triggered_at: event.triggered_at,
            state: event.state,
            lat: event.location.map(|l| l.lat),
            lng: event.location.map(|l| l.lng),
            countdown_deadline: event.countdown_deadline,
        }
    }
}
