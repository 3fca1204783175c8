//! Row shapes that don't map onto a domain type field-for-field (because the
//! domain type carries a `Vec<_>` or nested struct sqlx can't decode
//! directly) live here, alongside their `TryFrom` conversions. Everything
//! else (`User`, `Contact`, `AlertEpisode`, `DispatchJob`, `DeliveryLogEntry`)
//! derives `sqlx::FromRow` in place on the domain type in `crate::domain`.

mod reminder_settings;
mod sos_event;

pub use reminder_settings::ReminderSettingsRow;
pub use sos_event::SosEventRow;
