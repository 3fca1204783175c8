use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// The engine's read-only view of a user. Everything besides `last_checkin_at`
/// is owned by the account-management system (out of scope, spec §1) and
/// only read here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: String,
    pub cycle_days: i64,
    pub grace_hours: i64,
    pub last_checkin_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub device_push_token: Option<String>,
    pub location_consent: bool,
    pub location_consent_at: Option<DateTime<Utc>>,
}

impl User {
    /// The soft deadline before grace: `last_checkin_at + cycle_days`.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        self.last_checkin_at
            .map(|t| t + chrono::Duration::days(self.cycle_days))
    }

    /// Whether the user is overdue as of `now`: strictly past deadline+grace.
    /// Users with no baseline check-in are never overdue (spec §3, §8).
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        match self.deadline() {
            Some(deadline) => now > deadline + chrono::Duration::hours(self.grace_hours),
            None => false,
        }
    }

    /// Start of the overdue window, used to derive a stable episode id.
    pub fn window_start(&self) -> Option<DateTime<Utc>> {
        self.deadline()
    }
}

/// Per-user reminder configuration (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderSettings {
    pub user_id: String,
    pub hours_before: Vec<i64>,
    pub quiet_start: Option<NaiveTime>,
    pub quiet_end: Option<NaiveTime>,
    pub channels_enabled: Vec<ReminderChannel>,
    pub custom_prefix: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum ReminderChannel {
    Push,
    Email,
}

impl ReminderSettings {
    /// Whether `at` (in the user's local zone) falls inside the closed quiet
    /// window. A window crossing midnight is interpreted as the complement
    /// of the closed interval (spec §4.F, §8 boundary behavior).
    pub fn is_quiet_at(&self, at: NaiveTime) -> bool {
        match (self.quiet_start, self.quiet_end) {
            (Some(start), Some(end)) => {
                if start <= end {
                    at >= start && at <= end
                } else {
                    at >= start || at <= end
                }
            }
            _ => false,
        }
    }
}
