use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
pub enum EpisodeKind {
    MissedCheckin,
    Sos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
pub enum EpisodeResolution {
    UserCheckedIn,
    AllContactsDispatched,
    SosCancelled,
    SosSent,
}

/// Spec §3 invariant I1: the id is a pure function of `(user_id, window_start)`,
/// so concurrent scanners converge on the same id and a unique-constraint
/// insert decides the single winner (spec §5).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct AlertEpisode {
    pub id: String,
    pub user_id: String,
    pub kind: EpisodeKind,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub resolution: Option<EpisodeResolution>,
}

impl AlertEpisode {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }
}

/// Deterministic (not necessarily cryptographic) episode id for a missed
/// check-in window, per spec §4.E step 2. `DefaultHasher` is seeded with
/// fixed keys, so this is stable across processes and restarts, which is all
/// invariant I1 requires.
pub fn missed_checkin_episode_id(user_id: &str, window_start: DateTime<Utc>) -> String {
    let mut hasher = DefaultHasher::new();
    "missed-checkin".hash(&mut hasher);
    user_id.hash(&mut hasher);
    window_start.timestamp_nanos_opt().unwrap_or(0).hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Deterministic episode id for an SOS event, keyed by its own trigger id so
/// a crash-recovered replay of the same SOS event maps to the same episode.
pub fn sos_episode_id(sos_event_id: &str) -> String {
    let mut hasher = DefaultHasher::new();
    "sos".hash(&mut hasher);
    sos_event_id.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
