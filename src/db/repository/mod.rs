pub mod contact_repository;
pub mod delivery_log_repository;
pub mod episode_context_repository;
pub mod episode_repository;
pub mod reminder_settings_repository;
pub mod user_repository;

pub use contact_repository::ContactRepository;
pub use delivery_log_repository::DeliveryLogRepository;
pub use episode_context_repository::{EpisodeAlertContext, EpisodeContextRepository};
pub use episode_repository::EpisodeRepository;
pub use reminder_settings_repository::ReminderSettingsRepository;
pub use user_repository::UserRepository;
