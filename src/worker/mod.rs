//! Dispatch Worker Pool (spec §4.C): N concurrent workers pulling from the
//! durable queue, each running the claim → idempotency-check → consent-check
//! → render → adapter-call → record pipeline, with an explicit per-channel
//! adapter dispatch and `JobState` machine.

mod backoff;

pub use backoff::backoff;

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use sqlx::SqlitePool;
use tokio::sync::Semaphore;
use tracing::{info, instrument, warn};

use crate::adapters::{Adapter, AdapterOutcome};
use crate::clock::Clock;
use crate::consent::ConsentGate;
use crate::db::repository::{
    ContactRepository, DeliveryLogRepository, EpisodeContextRepository, EpisodeRepository,
};
use crate::domain::{
    truncate_error, Channel, Contact, DeliveryLogEntry, DispatchJob, EpisodeResolution, Outcome,
};
use crate::error::EngineResult;
use crate::ledger::{IdempotencyLedger, LedgerKey};
use crate::queue::{ClaimedJob, JobQueue};
use crate::render::{render, RenderContext, TemplateKind};

pub struct WorkerPoolConfig {
    pub worker_count: usize,
    pub max_attempts: i32,
    pub backoff_base: chrono::Duration,
    pub backoff_cap: chrono::Duration,
    pub visibility_timeout: chrono::Duration,
    pub claim_batch: i64,
}

pub struct DispatchWorkerPool {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
    queue: Arc<dyn JobQueue>,
    ledger: Arc<dyn IdempotencyLedger>,
    consent: Arc<ConsentGate>,
    email: Arc<dyn Adapter>,
    push: Arc<dyn Adapter>,
    config: WorkerPoolConfig,
}

impl DispatchWorkerPool {
    pub fn new(
        pool: SqlitePool,
        clock: Arc<dyn Clock>,
        queue: Arc<dyn JobQueue>,
        ledger: Arc<dyn IdempotencyLedger>,
        consent: Arc<ConsentGate>,
        email: Arc<dyn Adapter>,
        push: Arc<dyn Adapter>,
        config: WorkerPoolConfig,
    ) -> Self {
        Self {
            pool,
            clock,
            queue,
            ledger,
            consent,
            email,
            push,
            config,
        }
    }

    /// Runs until `shutdown_rx` fires. Workers share one `Semaphore` sized to
    /// `worker_count`, claiming from the same queue rather than each owning a
    /// private poll loop — one shared batch fetch, processed concurrently up
    /// to the permit count.
    pub async fn run(&self, mut shutdown_rx: tokio::sync::watch::Receiver<bool>) {
        let semaphore = Arc::new(Semaphore::new(self.config.worker_count));
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(2));

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    info!("dispatch worker pool shutting down");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.drain_once(&semaphore).await {
                        warn!(error = %e, "worker pool drain failed, continuing");
                    }
                }
            }
        }
    }

    async fn drain_once(&self, semaphore: &Arc<Semaphore>) -> EngineResult<()> {
        let now = self.clock.now();
        self.queue.sweep_expired_claims(now).await?;

        let available = semaphore.available_permits() as i64;
        let batch = self.config.claim_batch.min(available.max(0));
        let claims = self.queue.claim_ready(now, self.config.visibility_timeout, batch).await?;

        for claim in claims {
            let permit = Arc::clone(semaphore).acquire_owned().await.expect("semaphore not closed");
            let job_id = claim.job.id.clone();
            let this = self.clone_handles();

            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = this.process(claim).await {
                    warn!(job_id, error = %e, "job processing failed");
                }
            });
        }

        Ok(())
    }

    /// Synchronous drain used by the scenario tests (spec §6.4): claims every
    /// ready job and processes each to completion in order, with no spawned
    /// concurrency, so a test can assert on state immediately after it
    /// returns rather than polling for background tasks to finish.
    #[cfg(any(test, feature = "test-support"))]
    pub async fn process_all_ready(&self) -> EngineResult<usize> {
        let now = self.clock.now();
        self.queue.sweep_expired_claims(now).await?;

        let claims = self
            .queue
            .claim_ready(now, self.config.visibility_timeout, self.config.claim_batch)
            .await?;
        let count = claims.len();

        for claim in claims {
            self.process(claim).await?;
        }

        Ok(count)
    }

    /// Workers must not hold locks across adapter calls (spec §5); since
    /// each task owns its own clones of the shared handles, no lock is ever
    /// held across the `.await` inside `process`.
    fn clone_handles(&self) -> Self {
        Self {
            pool: self.pool.clone(),
            clock: Arc::clone(&self.clock),
            queue: Arc::clone(&self.queue),
            ledger: Arc::clone(&self.ledger),
            consent: Arc::clone(&self.consent),
            email: Arc::clone(&self.email),
            push: Arc::clone(&self.push),
            config: WorkerPoolConfig {
                worker_count: self.config.worker_count,
                max_attempts: self.config.max_attempts,
                backoff_base: self.config.backoff_base,
                backoff_cap: self.config.backoff_cap,
                visibility_timeout: self.config.visibility_timeout,
                claim_batch: self.config.claim_batch,
            },
        }
    }

    #[instrument(skip(self, claim), fields(job_id = %claim.job.id, episode_id = %claim.job.episode_id))]
    async fn process(&self, claim: ClaimedJob) -> EngineResult<()> {
        let job = &claim.job;

        if job.is_reminder {
            return self.process_reminder(&claim).await;
        }

        let key = LedgerKey {
            episode_id: job.episode_id.clone(),
            contact_id: job.contact_id.clone(),
            channel: job.channel,
        };

        if self.ledger.check(&key).await?.is_some() {
            self.finish_as_skipped(&claim, Outcome::SkippedDuplicate).await?;
            return Ok(());
        }

        let Some(contact) = ContactRepository::find_by_id(&self.pool, &job.contact_id).await? else {
            self.finish_as_skipped(&claim, Outcome::InvalidAddress).await?;
            return Ok(());
        };

        // Consent re-check (spec §4.C step 3): a contact's approval may have
        // been revoked between episode-open and this claim.
        let still_eligible = self
            .consent
            .eligible_contacts(&contact.user_id, self.clock.now())
            .await?
            .iter()
            .any(|c| c.id == contact.id);
        if !still_eligible {
            self.finish_as_skipped(&claim, Outcome::SkippedDuplicate).await?;
            return Ok(());
        }

        let ctx = self.build_render_context(job, &contact).await?;
        let kind = if job.is_sos {
            TemplateKind::SosAlert
        } else {
            TemplateKind::MissedCheckinAlert
        };
        let rendered = render(kind, &ctx);

        let adapter: &Arc<dyn Adapter> = match job.channel {
            Channel::Email => &self.email,
            Channel::Push => &self.push,
        };
        let outcome = adapter.send(&contact.address, &rendered, kind, &job.episode_id).await;

        self.apply_outcome(&claim, outcome).await
    }

    async fn build_render_context(&self, job: &DispatchJob, contact: &Contact) -> EngineResult<RenderContext> {
        let alert_ctx = EpisodeContextRepository::load(&self.pool, &job.episode_id).await?;
        Ok(RenderContext {
            episode_id: job.episode_id.clone(),
            user_display_name: contact.user_id.clone(),
            contact_display_name: contact.display_name.clone(),
            personal_message: alert_ctx.personal_message,
            pets: alert_ctx.pets,
            vault_entries: alert_ctx.vault_entries,
            location: alert_ctx.location,
            hours_before: None,
            custom_prefix: None,
        })
    }

    async fn apply_outcome(&self, claim: &ClaimedJob, outcome: AdapterOutcome) -> EngineResult<()> {
        let job = &claim.job;
        let now = self.clock.now();

        match &outcome {
            AdapterOutcome::Sent { provider_msg_id } => {
                let key = LedgerKey {
                    episode_id: job.episode_id.clone(),
                    contact_id: job.contact_id.clone(),
                    channel: job.channel,
                };
                self.ledger.record(&key, Outcome::Sent, Some(provider_msg_id.clone())).await?;
                self.log_delivery(job, Outcome::Sent, Some(provider_msg_id.clone()), None).await?;
                self.queue.acknowledge_delivered(claim).await?;
                self.maybe_close_episode(&job.episode_id).await?;
            }
            AdapterOutcome::InvalidAddress | AdapterOutcome::ProviderReject { .. } => {
                let logged = outcome.as_logged_outcome();
                let key = LedgerKey {
                    episode_id: job.episode_id.clone(),
                    contact_id: job.contact_id.clone(),
                    channel: job.channel,
                };
                self.ledger.record(&key, logged, None).await?;
                self.log_delivery(job, logged, None, outcome.reason().map(truncate_error)).await?;
                self.queue.acknowledge_dead(claim, outcome.reason().map(truncate_error)).await?;
                self.maybe_close_episode(&job.episode_id).await?;
            }
            AdapterOutcome::TransientFail { reason } => {
                if job.attempt < self.config.max_attempts {
                    let mut rng = StdRng::from_entropy();
                    let delay = backoff(job.attempt, self.config.backoff_base, self.config.backoff_cap, &mut rng);
                    self.queue.retry(claim, now + delay, Some(truncate_error(reason))).await?;
                } else {
                    self.log_delivery(job, Outcome::TransientFail, None, Some(truncate_error(reason))).await?;
                    self.queue.acknowledge_dead(claim, Some(truncate_error(reason))).await?;
                    self.maybe_close_episode(&job.episode_id).await?;
                }
            }
        }

        Ok(())
    }

    /// Terminates a job with no adapter call, either because another writer
    /// already delivered it (`SkippedDuplicate`, not an error) or because the
    /// contact is gone or no longer eligible (`InvalidAddress`, dead-lettered).
    async fn finish_as_skipped(&self, claim: &ClaimedJob, outcome: Outcome) -> EngineResult<()> {
        self.log_delivery(&claim.job, outcome, None, None).await?;
        match outcome {
            Outcome::SkippedDuplicate => self.queue.acknowledge_delivered(claim).await?,
            _ => self.queue.acknowledge_dead(claim, None).await?,
        }
        self.maybe_close_episode(&claim.job.episode_id).await
    }

    async fn log_delivery(
        &self,
        job: &DispatchJob,
        outcome: Outcome,
        provider_msg_id: Option<String>,
        sanitized_error: Option<String>,
    ) -> EngineResult<()> {
        DeliveryLogRepository::record(
            &self.pool,
            &DeliveryLogEntry {
                episode_id: job.episode_id.clone(),
                contact_id: job.contact_id.clone(),
                channel: job.channel,
                attempt: job.attempt,
                outcome,
                provider_msg_id,
                recorded_at: self.clock.now(),
                sanitized_error,
            },
        )
        .await
    }

    /// After any terminal transition, close the episode once every job for
    /// it has terminated (spec §4.C, final paragraph). An SOS episode still
    /// closes here if the worker pool happens to win the race against the
    /// SOS coordinator's own completion watcher, so the resolution must
    /// match what that watcher would have used — `sos-sent`, not
    /// `all-contacts-dispatched` (spec §4.G step 4).
    async fn maybe_close_episode(&self, episode_id: &str) -> EngineResult<()> {
        if !EpisodeRepository::all_jobs_terminal(&self.pool, episode_id).await? {
            return Ok(());
        }

        let resolution = match EpisodeRepository::find_by_id(&self.pool, episode_id).await? {
            Some(episode) if episode.kind == crate::domain::EpisodeKind::Sos => EpisodeResolution::SosSent,
            _ => EpisodeResolution::AllContactsDispatched,
        };

        EpisodeRepository::close(&self.pool, episode_id, resolution, self.clock.now()).await?;
        Ok(())
    }

    /// Reminder jobs never touch the episode machinery, the Ledger, or
    /// consent (spec §4.F); the recipient address is the job's `contact_id`
    /// field directly (the user's push token).
    async fn process_reminder(&self, claim: &ClaimedJob) -> EngineResult<()> {
        let job = &claim.job;
        let ctx = RenderContext {
            episode_id: job.episode_id.clone(),
            user_display_name: job.contact_id.clone(),
            contact_display_name: job.contact_id.clone(),
            hours_before: Some(0),
            ..Default::default()
        };
        let rendered = render(TemplateKind::Reminder, &ctx);
        let outcome = self
            .push
            .send(&job.contact_id, &rendered, TemplateKind::Reminder, &job.episode_id)
            .await;

        match outcome {
            AdapterOutcome::Sent { .. } => self.queue.acknowledge_delivered(claim).await,
            _ => {
                if job.attempt < self.config.max_attempts {
                    let mut rng = StdRng::from_entropy();
                    let delay = backoff(job.attempt, self.config.backoff_base, self.config.backoff_cap, &mut rng);
                    self.queue.retry(claim, self.clock.now() + delay, outcome.reason().map(truncate_error)).await?;
                    Ok(())
                } else {
                    self.queue.acknowledge_dead(claim, outcome.reason().map(truncate_error)).await
                }
            }
        }
    }
}
