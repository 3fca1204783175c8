//! SOS Coordinator (spec §4.G): an in-memory countdown state machine per
//! active SOS event, mirrored to a durable row after every transition for
//! crash recovery. State lives behind an `Arc<Self>` wrapping a
//! `RwLock<HashMap<_, _>>` of live countdowns, shared across the spawned
//! countdown and completion-watch tasks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use sqlx::SqlitePool;
use tokio::sync::RwLock;
use tokio::time::sleep;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::consent::ConsentGate;
use crate::db::repository::EpisodeRepository;
use crate::domain::{
    episode::sos_episode_id, Channel, EpisodeKind, EpisodeResolution, GeoPoint, SosEvent, SosState,
};
use crate::error::{EngineError, EngineResult};
use crate::queue::{JobQueue, NewJob};

mod store;

pub struct SosCoordinator {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    queue: Arc<dyn JobQueue>,
    consent: Arc<ConsentGate>,
    countdown: chrono::Duration,
    events: RwLock<HashMap<String, SosEvent>>,
}

impl SosCoordinator {
    pub fn new(
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        queue: Arc<dyn JobQueue>,
        consent: Arc<ConsentGate>,
        countdown: StdDuration,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            clock,
            queue,
            consent,
            countdown: chrono::Duration::from_std(countdown).unwrap_or(chrono::Duration::seconds(5)),
            events: RwLock::new(HashMap::new()),
        })
    }

    /// Replays any event not in a terminal state on startup (spec §4.G,
    /// final paragraph). A deadline already in the past causes an immediate
    /// transition to `dispatching`.
    pub async fn recover(self: &Arc<Self>) -> EngineResult<usize> {
        let rows = store::load_non_terminal(&self.pool).await?;
        let count = rows.len();

        for event in rows {
            self.events.write().await.insert(event.id.clone(), event.clone());
            self.spawn_countdown(event);
        }

        if count > 0 {
            info!(recovered = count, "resumed in-flight SOS events");
        }
        Ok(count)
    }

    /// Creates a new SOS event in `countdown` (spec §4.G step 1).
    pub async fn trigger(
        self: &Arc<Self>,
        user_id: &str,
        location: Option<GeoPoint>,
    ) -> EngineResult<SosEvent> {
        let now = self.clock.now();
        let event = SosEvent {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            triggered_at: now,
            state: SosState::Countdown,
            location,
            countdown_deadline: now + self.countdown,
        };

        store::persist_sos_row(&self.pool, &event).await?;
        self.events.write().await.insert(event.id.clone(), event.clone());
        self.spawn_countdown(event.clone());

        Ok(event)
    }

    /// Cancels an event still in `countdown` (invariant I5). Returns `false`
    /// if the event is unknown or already past `countdown`.
    pub async fn cancel(&self, sos_id: &str) -> EngineResult<bool> {
        let mut events = self.events.write().await;
        let Some(event) = events.get_mut(sos_id) else {
            return Ok(false);
        };

        if !event.state.is_cancellable() {
            return Ok(false);
        }

        event.state = SosState::Cancelled;
        let snapshot = event.clone();
        drop(events);

        store::persist_sos_row(&self.pool, &snapshot).await?;
        info!(sos_id, "SOS event cancelled during countdown");
        Ok(true)
    }

    fn spawn_countdown(self: &Arc<Self>, event: SosEvent) {
        let coordinator = Arc::clone(self);
        let wait = (event.countdown_deadline - coordinator.clock.now())
            .to_std()
            .unwrap_or(StdDuration::ZERO);

        tokio::spawn(async move {
            sleep(wait).await;
            if let Err(e) = coordinator.expire(&event.id).await {
                warn!(sos_id = %event.id, error = %e, "SOS countdown expiry failed");
            }
        });
    }

    /// Fires at the countdown deadline (spec §4.G steps 2-4). A no-op if the
    /// event was cancelled in the meantime.
    async fn expire(self: &Arc<Self>, sos_id: &str) -> EngineResult<()> {
        let mut events = self.events.write().await;
        let Some(event) = events.get_mut(sos_id) else {
            return Ok(());
        };
        if !event.state.is_cancellable() {
            return Ok(());
        }
        event.state = SosState::Dispatching;
        let snapshot = event.clone();
        drop(events);

        store::persist_sos_row(&self.pool, &snapshot).await?;
        info!(sos_id, "SOS countdown expired, dispatching");

        let now = self.clock.now();
        let episode_id = sos_episode_id(&snapshot.id);
        EpisodeRepository::create_if_absent(&self.pool, &episode_id, &snapshot.user_id, EpisodeKind::Sos, now)
            .await?;

        let mut contacts = self.consent.eligible_contacts(&snapshot.user_id, now).await?;
        // "Prefer push over email" (spec §4.G step 3): push jobs are
        // enqueued, and therefore claimed, first.
        contacts.sort_by_key(|c| if c.channel == Channel::Push { 0 } else { 1 });

        for contact in &contacts {
            self.queue
                .enqueue(NewJob {
                    episode_id: episode_id.clone(),
                    contact_id: contact.id.clone(),
                    channel: contact.channel,
                    attempt: 1,
                    not_before: now,
                    is_sos: true,
                    is_reminder: false,
                })
                .await?;
        }

        if contacts.is_empty() {
            EpisodeRepository::close(&self.pool, &episode_id, EpisodeResolution::SosSent, now).await?;
            self.finish(sos_id).await?;
        } else {
            self.spawn_completion_watch(sos_id.to_string(), episode_id);
        }

        Ok(())
    }

    /// Polls for every SOS dispatch job to terminate, then closes the
    /// episode and marks the event `sent` (spec §4.G step 4).
    fn spawn_completion_watch(self: &Arc<Self>, sos_id: String, episode_id: String) {
        let coordinator = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match EpisodeRepository::all_jobs_terminal(&coordinator.pool, &episode_id).await {
                    Ok(true) => break,
                    Ok(false) => sleep(StdDuration::from_millis(200)).await,
                    Err(e) => {
                        warn!(episode_id = %episode_id, error = %e, "failed polling SOS job completion");
                        sleep(StdDuration::from_millis(200)).await;
                    }
                }
            }

            let now = coordinator.clock.now();
            if let Err(e) = EpisodeRepository::close(&coordinator.pool, &episode_id, EpisodeResolution::SosSent, now).await {
                warn!(episode_id = %episode_id, error = %e, "failed to close SOS episode");
            }
            if let Err(e) = coordinator.finish(&sos_id).await {
                warn!(sos_id = %sos_id, error = %e, "failed to finalize SOS event");
            }
        });
    }

    async fn finish(&self, sos_id: &str) -> EngineResult<()> {
        let mut events = self.events.write().await;
        let Some(event) = events.get_mut(sos_id) else {
            return Err(EngineError::NotFound(format!("sos event {sos_id}")));
        };
        event.state = SosState::Sent;
        let snapshot = event.clone();
        drop(events);

        store::persist_sos_row(&self.pool, &snapshot).await?;
        info!(sos_id, "SOS event sent");
        Ok(())
    }

    pub async fn get(&self, sos_id: &str) -> Option<SosEvent> {
        self.events.read().await.get(sos_id).cloned()
    }
}
