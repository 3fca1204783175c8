//! Overdue Scanner (spec §4.E): a periodic sweep of the user table that
//! materializes `AlertEpisode`s and their per-contact dispatch jobs. The tick
//! loop is a `tokio::select!` over a shutdown signal and a fixed-period
//! `interval`.

pub mod context;

use std::sync::Arc;

use sqlx::SqlitePool;
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::consent::ConsentGate;
use crate::db::repository::{EpisodeAlertContext, EpisodeContextRepository, EpisodeRepository, UserRepository};
use crate::domain::{episode::missed_checkin_episode_id, EpisodeKind, EpisodeResolution};
use crate::error::EngineResult;
use crate::queue::{JobQueue, NewJob};

use context::AlertContextProvider;

pub struct OverdueScanner {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    queue: Arc<dyn JobQueue>,
    consent: Arc<ConsentGate>,
    context_provider: Arc<dyn AlertContextProvider>,
}

/// Per-tick outcome counters, surfaced for logging and tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanStats {
    pub overdue_users: usize,
    pub episodes_created: usize,
    pub episodes_skipped_existing: usize,
    pub episodes_cancelled_by_checkin: usize,
    pub episodes_closed_no_contacts: usize,
    pub jobs_enqueued: usize,
}

impl OverdueScanner {
    pub fn new(
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        queue: Arc<dyn JobQueue>,
        consent: Arc<ConsentGate>,
        context_provider: Arc<dyn AlertContextProvider>,
    ) -> Self {
        Self {
            pool,
            clock,
            queue,
            consent,
            context_provider,
        }
    }

    pub async fn run(&self, period: std::time::Duration, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(period);
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("overdue scanner shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "overdue scanner tick failed, continuing next tick");
                    }
                }
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn tick(&self) -> EngineResult<ScanStats> {
        let now = self.clock.now();
        let mut stats = ScanStats::default();

        // Reconcile episodes opened by an earlier tick whose user has since
        // checked in (spec §8 "late check-in cancels" — not just the
        // same-tick race the loop below guards against).
        for episode in EpisodeRepository::find_open_missed_checkin(&self.pool).await? {
            let still_overdue = UserRepository::find_by_id(&self.pool, &episode.user_id)
                .await?
                .map(|u| u.is_overdue(now))
                .unwrap_or(false);
            if !still_overdue {
                EpisodeRepository::close(&self.pool, &episode.id, EpisodeResolution::UserCheckedIn, now).await?;
                self.queue.cancel_queued_for_episode(&episode.id).await?;
                stats.episodes_cancelled_by_checkin += 1;
            }
        }

        let candidates = UserRepository::find_active_with_checkin(&self.pool).await?;
        let overdue: Vec<_> = candidates.into_iter().filter(|u| u.is_overdue(now)).collect();
        stats.overdue_users = overdue.len();

        for user in overdue {
            let Some(window_start) = user.window_start() else {
                continue;
            };
            let episode_id = missed_checkin_episode_id(&user.id, window_start);

            let created =
                EpisodeRepository::create_if_absent(&self.pool, &episode_id, &user.id, EpisodeKind::MissedCheckin, now)
                    .await?;

            if !created {
                stats.episodes_skipped_existing += 1;
                continue;
            }
            stats.episodes_created += 1;

            // Re-read to catch a check-in racing the insert (spec §4.E tie-break).
            let refreshed = UserRepository::find_by_id(&self.pool, &user.id).await?;
            let still_overdue = refreshed.as_ref().map(|u| u.is_overdue(now)).unwrap_or(false);
            if !still_overdue {
                EpisodeRepository::close(&self.pool, &episode_id, EpisodeResolution::UserCheckedIn, now).await?;
                self.queue.cancel_queued_for_episode(&episode_id).await?;
                stats.episodes_cancelled_by_checkin += 1;
                continue;
            }

            let contacts = self.consent.eligible_contacts(&user.id, now).await?;
            if contacts.is_empty() {
                EpisodeRepository::close(&self.pool, &episode_id, EpisodeResolution::AllContactsDispatched, now)
                    .await?;
                stats.episodes_closed_no_contacts += 1;
                info!(episode_id = %episode_id, user_id = %user.id, "episode closed immediately: no approved contacts");
                continue;
            }

            let location = if user.location_consent {
                self.context_provider.recent_location(&user).await
            } else {
                None
            };
            let alert_context = EpisodeAlertContext {
                personal_message: self.context_provider.personal_message(&user).await,
                pets: self.context_provider.included_pets(&user).await,
                vault_entries: self.context_provider.included_vault_entries(&user).await,
                location,
            };
            EpisodeContextRepository::save(&self.pool, &episode_id, &alert_context).await?;

            for contact in &contacts {
                self.queue
                    .enqueue(NewJob {
                        episode_id: episode_id.clone(),
                        contact_id: contact.id.clone(),
                        channel: contact.channel,
                        attempt: 1,
                        not_before: now,
                        is_sos: false,
                        is_reminder: false,
                    })
                    .await?;
                stats.jobs_enqueued += 1;
            }

            info!(
                episode_id = %episode_id,
                user_id = %user.id,
                contacts = contacts.len(),
                "episode opened, jobs enqueued"
            );
        }

        Ok(stats)
    }
}
