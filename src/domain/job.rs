use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::contact::Channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
pub enum JobState {
    Queued,
    InFlight,
    Delivered,
    Failed,
    Dead,
}

/// One attempt-set to deliver an episode's alert to one contact on one
/// channel (spec §3, §4.D). `attempt` starts at 1 and a failed retry
/// enqueues a *new* `DispatchJob` row rather than mutating this one in place,
/// per invariant I3's explicit state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DispatchJob {
    pub id: String,
    pub episode_id: String,
    pub contact_id: String,
    pub channel: Channel,
    pub attempt: i32,
    pub not_before: DateTime<Utc>,
    pub state: JobState,
    pub last_error: Option<String>,
    /// SOS jobs bypass the durable queue (spec §4.G) but still carry this
    /// flag so the worker can apply the "prefer push over email" rule and
    /// select the `sos-alert` template kind.
    pub is_sos: bool,
    /// Reminder jobs (spec §4.F) share the queue and worker pool with alert
    /// jobs but never touch an episode: `episode_id` holds a synthetic,
    /// non-`alert_episodes` key, `contact_id` holds the recipient's push
    /// token directly, and the worker skips the Ledger/consent/episode-
    /// closure steps for them entirely.
    pub is_reminder: bool,
}

impl DispatchJob {
    pub fn is_terminal(&self) -> bool {
        matches!(self.state, JobState::Delivered | JobState::Dead)
    }
}

/// Truncate an error message to a bounded length before it is persisted,
/// matching spec §3's `last_error` field contract ("string, truncated").
pub fn truncate_error(msg: &str) -> String {
    const MAX_LEN: usize = 500;
    if msg.len() <= MAX_LEN {
        msg.to_string()
    } else {
        let mut truncated = msg.chars().take(MAX_LEN).collect::<String>();
        truncated.push('…');
        truncated
    }
}
