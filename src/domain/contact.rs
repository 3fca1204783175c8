use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
pub enum Channel {
    Email,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "kebab-case")]
pub enum ConsentStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

/// An emergency contact, read by the engine from the account-management
/// schema (spec §3). Creation/CRUD of contacts is out of scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Contact {
    pub id: String,
    pub user_id: String,
    pub display_name: String,
    pub channel: Channel,
    pub address: String,
    pub priority: i32,
    pub consent_status: ConsentStatus,
    pub consent_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Contact {
    /// Eligibility rule for the Consent Gate (spec §4.H): approved, and not
    /// expired as of `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.consent_status == ConsentStatus::Approved
            && self.consent_expires_at.map(|exp| exp > now).unwrap_or(true)
    }
}
