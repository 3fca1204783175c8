//! Process entry point: load config, init tracing, init db, construct the
//! engine's components, spawn the scanner/reminder/SOS/worker-pool background
//! tasks, and wait for a shutdown signal. No HTTP server (out of scope,
//! spec §1 Non-goals).

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use solocheck_engine::adapters::email::EmailAdapter;
use solocheck_engine::adapters::push::PushAdapter;
use solocheck_engine::clock::{self, SystemClock};
use solocheck_engine::config::Config;
use solocheck_engine::consent::ConsentGate;
use solocheck_engine::db;
use solocheck_engine::ledger::{self, SqliteLedger};
use solocheck_engine::queue::{self, SqliteJobQueue};
use solocheck_engine::reminder::ReminderScheduler;
use solocheck_engine::scanner::context::NullContextProvider;
use solocheck_engine::scanner::{self, OverdueScanner};
use solocheck_engine::sos::SosCoordinator;
use solocheck_engine::worker::{DispatchWorkerPool, WorkerPoolConfig};
use solocheck_engine::adapters;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "solocheck_engine=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    tracing::info!("starting SoloCheck detection-and-dispatch engine");

    let pool = db::pool::init_db(&config.database.url, config.database.max_connections).await?;
    tracing::info!(
        url = %db::pool::redact_db_url(&config.database.url),
        "database ready"
    );

    let clock = Arc::new(SystemClock) as Arc<dyn clock::Clock>;
    let queue = Arc::new(SqliteJobQueue::new(pool.clone())) as Arc<dyn queue::JobQueue>;
    let ledger_handle = Arc::new(SqliteLedger::new(pool.clone())) as Arc<dyn ledger::IdempotencyLedger>;
    let consent = ConsentGate::new(pool.clone());
    let context_provider =
        Arc::new(NullContextProvider) as Arc<dyn scanner::context::AlertContextProvider>;

    let email = Arc::new(EmailAdapter::new(&config.smtp.to_credentials())?) as Arc<dyn adapters::Adapter>;
    let push = Arc::new(PushAdapter::new(&config.push.to_provider_config())?) as Arc<dyn adapters::Adapter>;

    let scanner = OverdueScanner::new(
        pool.clone(),
        Arc::clone(&clock),
        Arc::clone(&queue),
        Arc::clone(&consent),
        context_provider,
    );

    let reminder_scheduler = ReminderScheduler::new(
        pool.clone(),
        Arc::clone(&clock),
        Arc::clone(&queue),
        config.timing.reminder_period(),
    );

    let sos_coordinator = SosCoordinator::new(
        pool.clone(),
        Arc::clone(&clock),
        Arc::clone(&queue),
        Arc::clone(&consent),
        config.timing.sos_countdown(),
    );
    let recovered = sos_coordinator.recover().await?;
    tracing::info!(recovered, "SOS coordinator ready");

    let worker_pool = DispatchWorkerPool::new(
        pool.clone(),
        Arc::clone(&clock),
        Arc::clone(&queue),
        ledger_handle,
        consent,
        email,
        push,
        WorkerPoolConfig {
            worker_count: config.timing.worker_count,
            max_attempts: config.timing.max_attempts,
            backoff_base: config.timing.backoff_base(),
            backoff_cap: config.timing.backoff_cap(),
            visibility_timeout: config.timing.visibility_timeout(),
            claim_batch: config.timing.claim_batch,
        },
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let scanner_handle = tokio::spawn({
        let period = config.timing.scan_period();
        let rx = shutdown_rx.clone();
        async move { scanner.run(period, rx).await }
    });

    let reminder_handle = tokio::spawn({
        let period = config.timing.reminder_period();
        let rx = shutdown_rx.clone();
        async move { reminder_scheduler.run(period, rx).await }
    });

    let worker_handle = tokio::spawn({
        let rx = shutdown_rx.clone();
        async move { worker_pool.run(rx).await }
    });

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    let _ = tokio::join!(scanner_handle, reminder_handle, worker_handle);
    tracing::info!("engine shut down cleanly, SOS events in flight remain recoverable on next start");
    drop(sos_coordinator);

    Ok(())
}
