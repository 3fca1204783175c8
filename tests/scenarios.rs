//! End-to-end scenario tests against a real (tempfile-backed) SQLite
//! database, exercising the scanner, reminder scheduler, SOS coordinator and
//! dispatch worker pool together rather than unit-by-unit, hitting a real
//! database rather than mocking the repository layer.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tempfile::NamedTempFile;

use solocheck_engine::adapters::fake::ScriptedAdapter;
use solocheck_engine::adapters::{Adapter, AdapterOutcome};
use solocheck_engine::clock::{Clock, FrozenClock};
use solocheck_engine::consent::ConsentGate;
use solocheck_engine::db;
use solocheck_engine::db::repository::{DeliveryLogRepository, EpisodeRepository, UserRepository};
use solocheck_engine::domain::episode::missed_checkin_episode_id;
use solocheck_engine::domain::{Channel, ConsentStatus, EpisodeKind, EpisodeResolution, JobState};
use solocheck_engine::ledger::{IdempotencyLedger, SqliteLedger};
use solocheck_engine::queue::{JobQueue, SqliteJobQueue};
use solocheck_engine::scanner::context::NullContextProvider;
use solocheck_engine::scanner::OverdueScanner;
use solocheck_engine::sos::SosCoordinator;
use solocheck_engine::worker::{DispatchWorkerPool, WorkerPoolConfig};

fn dt(s: &str) -> DateTime<Utc> {
    s.parse().unwrap()
}

async fn test_pool() -> SqlitePool {
    let file = NamedTempFile::new().unwrap();
    // Keep the tempfile alive for the process lifetime of the test binary;
    // leaking it here is fine, each test gets its own throwaway file and the
    // OS reclaims it at process exit.
    let path = file.path().to_path_buf();
    std::mem::forget(file);
    let url = format!("sqlite://{}", path.display());
    db::pool::init_db(&url, 5).await.unwrap()
}

async fn insert_user(
    pool: &SqlitePool,
    id: &str,
    cycle_days: i64,
    grace_hours: i64,
    last_checkin_at: Option<DateTime<Utc>>,
    device_push_token: Option<&str>,
) {
    sqlx::query(
        "INSERT INTO users (id, cycle_days, grace_hours, last_checkin_at, is_active, device_push_token, location_consent) \
         VALUES (?, ?, ?, ?, 1, ?, 0)",
    )
    .bind(id)
    .bind(cycle_days)
    .bind(grace_hours)
    .bind(last_checkin_at)
    .bind(device_push_token)
    .execute(pool)
    .await
    .unwrap();
}

async fn insert_contact(pool: &SqlitePool, id: &str, user_id: &str, channel: Channel, address: &str, priority: i32) {
    sqlx::query(
        "INSERT INTO contacts (id, user_id, display_name, channel, address, priority, consent_status, consent_expires_at, created_at) \
         VALUES (?, ?, ?, ?, ?, ?, ?, NULL, ?)",
    )
    .bind(id)
    .bind(user_id)
    .bind(format!("contact-{id}"))
    .bind(channel)
    .bind(address)
    .bind(priority)
    .bind(ConsentStatus::Approved)
    .bind(Utc::now())
    .execute(pool)
    .await
    .unwrap();
}

async fn job_states_for_episode(pool: &SqlitePool, episode_id: &str) -> Vec<JobState> {
    sqlx::query_scalar::<_, JobState>("SELECT state FROM dispatch_jobs WHERE episode_id = ? ORDER BY attempt ASC")
        .bind(episode_id)
        .fetch_all(pool)
        .await
        .unwrap()
}

async fn ledger_entry_count_for_episode(pool: &SqlitePool, episode_id: &str) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM idempotency WHERE episode_id = ?")
        .bind(episode_id)
        .fetch_one(pool)
        .await
        .unwrap()
}

struct Harness {
    pool: SqlitePool,
    clock: Arc<FrozenClock>,
    scanner: OverdueScanner,
    worker: DispatchWorkerPool,
}

async fn harness(now: DateTime<Utc>, email: Arc<dyn Adapter>, push: Arc<dyn Adapter>) -> Harness {
    let pool = test_pool().await;
    let clock = FrozenClock::new(now);
    let queue = Arc::new(SqliteJobQueue::new(pool.clone())) as Arc<dyn JobQueue>;
    let ledger = Arc::new(SqliteLedger::new(pool.clone())) as Arc<dyn IdempotencyLedger>;
    let consent = ConsentGate::new(pool.clone());
    let context = Arc::new(NullContextProvider) as Arc<dyn solocheck_engine::scanner::context::AlertContextProvider>;

    let scanner = OverdueScanner::new(
        pool.clone(),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::clone(&queue),
        Arc::clone(&consent),
        context,
    );

    let worker = DispatchWorkerPool::new(
        pool.clone(),
        Arc::clone(&clock) as Arc<dyn Clock>,
        queue,
        ledger,
        consent,
        email,
        push,
        WorkerPoolConfig {
            worker_count: 4,
            max_attempts: 5,
            backoff_base: chrono::Duration::seconds(1),
            backoff_cap: chrono::Duration::seconds(60),
            visibility_timeout: chrono::Duration::seconds(30),
            claim_batch: 20,
        },
    );

    Harness { pool, clock, scanner, worker }
}

#[tokio::test]
async fn scenario_1_simple_overdue() {
    let always_sent = |id: &str| {
        Arc::new(ScriptedAdapter::always(AdapterOutcome::Sent {
            provider_msg_id: id.to_string(),
        })) as Arc<dyn Adapter>
    };

    let h = harness(dt("2025-01-08T00:00:01Z"), always_sent("email-1"), always_sent("push-1")).await;

    insert_user(&h.pool, "u1", 7, 24, Some(dt("2025-01-01T00:00:00Z")), None).await;
    insert_contact(&h.pool, "c1", "u1", Channel::Email, "c1@example.com", 1).await;
    insert_contact(&h.pool, "c2", "u1", Channel::Push, "push-token-c2", 2).await;

    let stats = h.scanner.tick().await.unwrap();
    assert_eq!(stats.episodes_created, 1);
    assert_eq!(stats.jobs_enqueued, 2);

    let episode_id = missed_checkin_episode_id("u1", dt("2025-01-08T00:00:00Z"));
    let episode = EpisodeRepository::find_by_id(&h.pool, &episode_id).await.unwrap().unwrap();
    assert!(episode.is_open());

    let processed = h.worker.process_all_ready().await.unwrap();
    assert_eq!(processed, 2);

    assert_eq!(ledger_entry_count_for_episode(&h.pool, &episode_id).await, 2);

    let episode = EpisodeRepository::find_by_id(&h.pool, &episode_id).await.unwrap().unwrap();
    assert!(!episode.is_open());
    assert_eq!(episode.resolution, Some(EpisodeResolution::AllContactsDispatched));

    assert_eq!(DeliveryLogRepository::count_for_episode(&h.pool, &episode_id).await.unwrap(), 2);
}

#[tokio::test]
async fn scenario_2_late_checkin_cancels() {
    let always_sent = Arc::new(ScriptedAdapter::always(AdapterOutcome::Sent {
        provider_msg_id: "x".into(),
    })) as Arc<dyn Adapter>;

    let h = harness(dt("2025-01-08T00:00:01Z"), Arc::clone(&always_sent), always_sent).await;

    insert_user(&h.pool, "u1", 7, 24, Some(dt("2025-01-01T00:00:00Z")), None).await;
    insert_contact(&h.pool, "c1", "u1", Channel::Email, "c1@example.com", 1).await;
    insert_contact(&h.pool, "c2", "u1", Channel::Push, "push-token-c2", 2).await;

    let stats = h.scanner.tick().await.unwrap();
    assert_eq!(stats.episodes_created, 1);
    assert_eq!(stats.jobs_enqueued, 2);

    let episode_id = missed_checkin_episode_id("u1", dt("2025-01-08T00:00:00Z"));

    // u1 checks in a second later, before any worker claims a job.
    UserRepository::record_checkin(&h.pool, "u1", dt("2025-01-08T00:00:02Z")).await.unwrap();
    h.clock.set(dt("2025-01-08T00:00:02Z"));

    let stats = h.scanner.tick().await.unwrap();
    assert_eq!(stats.episodes_cancelled_by_checkin, 1);

    let episode = EpisodeRepository::find_by_id(&h.pool, &episode_id).await.unwrap().unwrap();
    assert_eq!(episode.resolution, Some(EpisodeResolution::UserCheckedIn));
    assert!(!episode.is_open());

    let states = job_states_for_episode(&h.pool, &episode_id).await;
    assert_eq!(states, vec![JobState::Dead, JobState::Dead]);

    assert_eq!(ledger_entry_count_for_episode(&h.pool, &episode_id).await, 0);

    // A worker pass afterwards must not somehow still dispatch anything.
    let processed = h.worker.process_all_ready().await.unwrap();
    assert_eq!(processed, 0);
}

#[tokio::test]
async fn scenario_3_transient_then_success() {
    let adapter = Arc::new(ScriptedAdapter::sequence(vec![
        AdapterOutcome::TransientFail { reason: "timeout".into() },
        AdapterOutcome::TransientFail { reason: "timeout".into() },
        AdapterOutcome::Sent { provider_msg_id: "ok".into() },
    ])) as Arc<dyn Adapter>;
    let push = Arc::new(ScriptedAdapter::always(AdapterOutcome::Sent { provider_msg_id: "unused".into() }))
        as Arc<dyn Adapter>;

    let h = harness(dt("2025-01-08T00:00:01Z"), Arc::clone(&adapter), push).await;

    insert_user(&h.pool, "u1", 7, 24, Some(dt("2025-01-01T00:00:00Z")), None).await;
    insert_contact(&h.pool, "c1", "u1", Channel::Email, "c1@example.com", 1).await;

    h.scanner.tick().await.unwrap();
    let episode_id = missed_checkin_episode_id("u1", dt("2025-01-08T00:00:00Z"));

    // Attempt 1: transient failure, requeued with backoff.
    assert_eq!(h.worker.process_all_ready().await.unwrap(), 1);
    // The retry's `not_before` is in the future; move the clock forward past
    // any backoff window before draining again.
    h.clock.advance(chrono::Duration::minutes(10));

    // Attempt 2: transient failure again.
    assert_eq!(h.worker.process_all_ready().await.unwrap(), 1);
    h.clock.advance(chrono::Duration::minutes(10));

    // Attempt 3: success.
    assert_eq!(h.worker.process_all_ready().await.unwrap(), 1);

    let states = job_states_for_episode(&h.pool, &episode_id).await;
    assert_eq!(states.len(), 3);
    assert_eq!(states[0], JobState::Failed);
    assert_eq!(states[1], JobState::Failed);
    assert_eq!(states[2], JobState::Delivered);

    assert_eq!(ledger_entry_count_for_episode(&h.pool, &episode_id).await, 1);

    let episode = EpisodeRepository::find_by_id(&h.pool, &episode_id).await.unwrap().unwrap();
    assert!(!episode.is_open());
    assert_eq!(episode.resolution, Some(EpisodeResolution::AllContactsDispatched));
}

#[tokio::test]
async fn scenario_4_invalid_address() {
    let push = Arc::new(ScriptedAdapter::always(AdapterOutcome::InvalidAddress)) as Arc<dyn Adapter>;
    let email = Arc::new(ScriptedAdapter::always(AdapterOutcome::Sent { provider_msg_id: "unused".into() }))
        as Arc<dyn Adapter>;

    let h = harness(dt("2025-01-08T00:00:01Z"), email, push).await;

    insert_user(&h.pool, "u1", 7, 24, Some(dt("2025-01-01T00:00:00Z")), None).await;
    insert_contact(&h.pool, "c1", "u1", Channel::Push, "stale-token", 1).await;

    h.scanner.tick().await.unwrap();
    let episode_id = missed_checkin_episode_id("u1", dt("2025-01-08T00:00:00Z"));

    assert_eq!(h.worker.process_all_ready().await.unwrap(), 1);

    let states = job_states_for_episode(&h.pool, &episode_id).await;
    assert_eq!(states, vec![JobState::Dead]);

    assert_eq!(ledger_entry_count_for_episode(&h.pool, &episode_id).await, 1);

    let episode = EpisodeRepository::find_by_id(&h.pool, &episode_id).await.unwrap().unwrap();
    assert!(!episode.is_open());
    assert_eq!(episode.resolution, Some(EpisodeResolution::AllContactsDispatched));
}

#[tokio::test]
async fn scenario_5_sos_cancelled_in_countdown() {
    let pool = test_pool().await;
    let t = dt("2025-01-08T00:00:00Z");
    let clock = FrozenClock::new(t);
    let queue = Arc::new(SqliteJobQueue::new(pool.clone())) as Arc<dyn JobQueue>;
    let consent = ConsentGate::new(pool.clone());

    insert_user(&pool, "u1", 7, 24, Some(t), None).await;
    insert_contact(&pool, "c1", "u1", Channel::Email, "c1@example.com", 1).await;

    // The countdown is a genuine wall-clock safety timer, not something the
    // business clock should warp, so this uses a short real duration
    // (spec's "countdown is 5s" scaled down for test speed) rather than
    // advancing the frozen clock.
    let coordinator = SosCoordinator::new(
        pool.clone(),
        Arc::clone(&clock) as Arc<dyn Clock>,
        queue,
        consent,
        std::time::Duration::from_millis(150),
    );

    let event = coordinator.trigger("u1", None).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    let cancelled = coordinator.cancel(&event.id).await.unwrap();
    assert!(cancelled);

    // Outlive the countdown deadline so a would-be expiry has a chance to
    // run and confirm it correctly no-ops against the cancelled state.
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    let final_state = coordinator.get(&event.id).await.unwrap();
    assert_eq!(final_state.state, solocheck_engine::domain::SosState::Cancelled);

    let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dispatch_jobs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(job_count, 0);

    let ledger_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM idempotency")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(ledger_count, 0);
}

#[tokio::test]
async fn scenario_6_sos_fires() {
    let pool = test_pool().await;
    let t = dt("2025-01-08T00:00:00Z");
    let clock = FrozenClock::new(t);
    let queue = Arc::new(SqliteJobQueue::new(pool.clone())) as Arc<dyn JobQueue>;
    let ledger = Arc::new(SqliteLedger::new(pool.clone())) as Arc<dyn IdempotencyLedger>;
    let consent = ConsentGate::new(pool.clone());

    insert_user(&pool, "u1", 7, 24, Some(t), None).await;
    insert_contact(&pool, "c1", "u1", Channel::Email, "c1@example.com", 1).await;
    insert_contact(&pool, "c2", "u1", Channel::Push, "push-token-c2", 2).await;

    let email = Arc::new(ScriptedAdapter::always(AdapterOutcome::Sent { provider_msg_id: "e".into() })) as Arc<dyn Adapter>;
    let push = Arc::new(ScriptedAdapter::always(AdapterOutcome::Sent { provider_msg_id: "p".into() })) as Arc<dyn Adapter>;

    let worker = DispatchWorkerPool::new(
        pool.clone(),
        Arc::clone(&clock) as Arc<dyn Clock>,
        Arc::clone(&queue),
        ledger,
        Arc::clone(&consent),
        email,
        push,
        WorkerPoolConfig {
            worker_count: 4,
            max_attempts: 5,
            backoff_base: chrono::Duration::seconds(1),
            backoff_cap: chrono::Duration::seconds(60),
            visibility_timeout: chrono::Duration::seconds(30),
            claim_batch: 20,
        },
    );

    let coordinator = SosCoordinator::new(
        pool.clone(),
        Arc::clone(&clock) as Arc<dyn Clock>,
        queue,
        consent,
        std::time::Duration::from_millis(150),
    );
    let event = coordinator.trigger("u1", None).await.unwrap();

    // Outlive the countdown so the spawned expiry task enqueues the jobs.
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;

    let episode_id = solocheck_engine::domain::episode::sos_episode_id(&event.id);
    let episode = EpisodeRepository::find_by_id(&pool, &episode_id).await.unwrap().unwrap();
    assert_eq!(episode.kind, EpisodeKind::Sos);

    let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dispatch_jobs WHERE episode_id = ?")
        .bind(&episode_id)
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(job_count, 2);

    assert_eq!(worker.process_all_ready().await.unwrap(), 2);

    // Completion watcher polls asynchronously; give it a moment to observe
    // both jobs terminal and close the episode / finish the event.
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;

    let episode = EpisodeRepository::find_by_id(&pool, &episode_id).await.unwrap().unwrap();
    assert!(!episode.is_open());
    assert_eq!(episode.resolution, Some(EpisodeResolution::SosSent));

    let final_state = coordinator.get(&event.id).await.unwrap();
    assert_eq!(final_state.state, solocheck_engine::domain::SosState::Sent);
}

#[tokio::test]
async fn boundary_zero_approved_contacts_closes_immediately() {
    let email = Arc::new(ScriptedAdapter::always(AdapterOutcome::Sent { provider_msg_id: "unused".into() })) as Arc<dyn Adapter>;
    let push = Arc::clone(&email);
    let h = harness(dt("2025-01-08T00:00:01Z"), email, push).await;

    insert_user(&h.pool, "u1", 7, 24, Some(dt("2025-01-01T00:00:00Z")), None).await;

    let stats = h.scanner.tick().await.unwrap();
    assert_eq!(stats.episodes_created, 1);
    assert_eq!(stats.episodes_closed_no_contacts, 1);
    assert_eq!(stats.jobs_enqueued, 0);

    let episode_id = missed_checkin_episode_id("u1", dt("2025-01-08T00:00:00Z"));
    let episode = EpisodeRepository::find_by_id(&h.pool, &episode_id).await.unwrap().unwrap();
    assert!(!episode.is_open());
    assert_eq!(episode.resolution, Some(EpisodeResolution::AllContactsDispatched));
}

#[tokio::test]
async fn boundary_zero_width_grace_opens_one_second_past_deadline() {
    let email = Arc::new(ScriptedAdapter::always(AdapterOutcome::Sent { provider_msg_id: "unused".into() })) as Arc<dyn Adapter>;
    let push = Arc::clone(&email);
    // cycle_days=1, grace_hours=0, last_checkin 24h1s before now.
    let h = harness(dt("2025-01-02T00:00:01Z"), email, push).await;

    insert_user(&h.pool, "u1", 1, 0, Some(dt("2025-01-01T00:00:00Z")), None).await;
    insert_contact(&h.pool, "c1", "u1", Channel::Email, "c1@example.com", 1).await;

    let stats = h.scanner.tick().await.unwrap();
    assert_eq!(stats.episodes_created, 1);
}

#[tokio::test]
async fn boundary_never_overdue_without_a_baseline_checkin() {
    let email = Arc::new(ScriptedAdapter::always(AdapterOutcome::Sent { provider_msg_id: "unused".into() })) as Arc<dyn Adapter>;
    let push = Arc::clone(&email);
    let h = harness(dt("2030-01-01T00:00:00Z"), email, push).await;

    insert_user(&h.pool, "u1", 1, 0, None, None).await;

    let stats = h.scanner.tick().await.unwrap();
    assert_eq!(stats.episodes_created, 0);
    assert_eq!(stats.overdue_users, 0);
}

#[tokio::test]
async fn scanner_replay_over_frozen_clock_is_idempotent() {
    let email = Arc::new(ScriptedAdapter::always(AdapterOutcome::Sent { provider_msg_id: "unused".into() })) as Arc<dyn Adapter>;
    let push = Arc::clone(&email);
    let h = harness(dt("2025-01-08T00:00:01Z"), email, push).await;

    insert_user(&h.pool, "u1", 7, 24, Some(dt("2025-01-01T00:00:00Z")), None).await;
    insert_contact(&h.pool, "c1", "u1", Channel::Email, "c1@example.com", 1).await;
    insert_contact(&h.pool, "c2", "u1", Channel::Push, "push-token-c2", 2).await;

    let first = h.scanner.tick().await.unwrap();
    assert_eq!(first.episodes_created, 1);
    assert_eq!(first.jobs_enqueued, 2);

    let second = h.scanner.tick().await.unwrap();
    assert_eq!(second.episodes_created, 0);
    assert_eq!(second.jobs_enqueued, 0);
    assert_eq!(second.episodes_skipped_existing, 1);

    let episode_id = missed_checkin_episode_id("u1", dt("2025-01-08T00:00:00Z"));
    let job_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dispatch_jobs WHERE episode_id = ?")
        .bind(&episode_id)
        .fetch_one(&h.pool)
        .await
        .unwrap();
    assert_eq!(job_count, 2);
}

#[tokio::test]
async fn replaying_a_delivered_job_never_double_sends() {
    let email = Arc::new(ScriptedAdapter::always(AdapterOutcome::Sent { provider_msg_id: "only-once".into() })) as Arc<dyn Adapter>;
    let push = Arc::clone(&email);
    let h = harness(dt("2025-01-08T00:00:01Z"), Arc::clone(&email), push).await;

    insert_user(&h.pool, "u1", 7, 24, Some(dt("2025-01-01T00:00:00Z")), None).await;
    insert_contact(&h.pool, "c1", "u1", Channel::Email, "c1@example.com", 1).await;

    h.scanner.tick().await.unwrap();
    let episode_id = missed_checkin_episode_id("u1", dt("2025-01-08T00:00:00Z"));

    assert_eq!(h.worker.process_all_ready().await.unwrap(), 1);
    // The job is now `delivered`; a second drain finds nothing left to claim,
    // simulating a visibility-timeout replay that arrives after the first
    // attempt already completed.
    assert_eq!(h.worker.process_all_ready().await.unwrap(), 0);

    assert_eq!(ledger_entry_count_for_episode(&h.pool, &episode_id).await, 1);
}

#[tokio::test]
async fn quiet_hours_crossing_midnight_suppresses_a_reminder_at_3am() {
    use solocheck_engine::domain::{ReminderChannel, ReminderSettings};

    let settings = ReminderSettings {
        user_id: "u1".into(),
        hours_before: vec![1],
        quiet_start: Some("22:00:00".parse().unwrap()),
        quiet_end: Some("07:00:00".parse().unwrap()),
        channels_enabled: vec![ReminderChannel::Push],
        custom_prefix: None,
    };

    assert!(settings.is_quiet_at("03:00:00".parse().unwrap()));
    assert!(!settings.is_quiet_at("12:00:00".parse().unwrap()));
}
