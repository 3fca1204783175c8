//! Reminder Scheduler (spec §4.F): an independent periodic sweep emitting
//! reminder push jobs at configured offsets before each user's deadline,
//! honoring quiet hours. Does not touch the episode machinery at all.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::db::repository::{ReminderSettingsRepository, UserRepository};
use crate::domain::{Channel, ReminderChannel};
use crate::error::EngineResult;
use crate::queue::{JobQueue, NewJob};

pub struct ReminderScheduler {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    queue: Arc<dyn JobQueue>,
    /// How far ahead of `now` a computed `fire_at` still counts as "due this
    /// tick" (spec §4.F step 3: "lies within the next scheduler period").
    period: chrono::Duration,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReminderStats {
    pub candidates: usize,
    pub fired: usize,
    pub suppressed_quiet_hours: usize,
    pub already_fired: usize,
}

impl ReminderScheduler {
    pub fn new(
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        queue: Arc<dyn JobQueue>,
        period: std::time::Duration,
    ) -> Self {
        Self {
            pool,
            clock,
            queue,
            period: ChronoDuration::from_std(period).unwrap_or(ChronoDuration::minutes(5)),
        }
    }

    pub async fn run(&self, period: std::time::Duration, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("reminder scheduler shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "reminder scheduler tick failed, continuing next tick");
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn tick(&self) -> EngineResult<ReminderStats> {
        let now = self.clock.now();
        let mut stats = ReminderStats::default();

        let users = UserRepository::find_active_with_checkin(&self.pool).await?;

        for user in users {
            let Some(settings) = ReminderSettingsRepository::find_by_user(&self.pool, &user.id).await? else {
                continue;
            };
            let Some(deadline) = user.deadline() else {
                continue;
            };
            let cycle_anchor = user.last_checkin_at.expect("filtered to non-null above");
            stats.candidates += 1;

            for hours_before in &settings.hours_before {
                let fire_at = deadline - ChronoDuration::hours(*hours_before);

                if fire_at < now || fire_at > now + self.period {
                    continue;
                }

                if settings.is_quiet_at(fire_at.time()) {
                    stats.suppressed_quiet_hours += 1;
                    continue;
                }

                if !settings.channels_enabled.contains(&ReminderChannel::Push) {
                    continue;
                }

                let recorded = ReminderSettingsRepository::record_fired(
                    &self.pool,
                    &user.id,
                    cycle_anchor,
                    *hours_before,
                    now,
                )
                .await?;

                if !recorded {
                    stats.already_fired += 1;
                    continue;
                }

                let Some(device_token) = user.device_push_token.as_ref() else {
                    continue;
                };

                self.queue
                    .enqueue(NewJob {
                        episode_id: format!("reminder:{}:{}:{}", user.id, cycle_anchor.timestamp(), hours_before),
                        contact_id: device_token.clone(),
                        channel: Channel::Push,
                        attempt: 1,
                        not_before: now,
                        is_sos: false,
                        is_reminder: true,
                    })
                    .await?;
                stats.fired += 1;

                info!(user_id = %user.id, hours_before, "reminder fired");
            }
        }

        Ok(stats)
    }
}
