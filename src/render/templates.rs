//! Fixed template strings (spec §4.B, §6). Every rendered body ends with
//! `LEGAL_DISCLAIMER`; its wording is a fixed contract, not a CRUD-editable
//! field, so it lives here as a constant rather than in the database.

pub const LEGAL_DISCLAIMER: &str = "\
This service does not determine your loved one's well-being beyond connectivity.
If you believe this is an urgent emergency, contact emergency services directly.
This alert was triggered solely by the absence of an expected check-in, nothing more.";

pub const EMAIL_SUBJECT_PREFIX: &str = "[SoloCheck]";

pub fn email_subject(display_name: &str) -> String {
    format!("{} {} - connectivity alert", EMAIL_SUBJECT_PREFIX, display_name)
}
