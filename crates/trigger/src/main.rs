use std::sync::Arc;
use std::time::Duration;

use manna_common::config::AppConfig;
use manna_common::db;
use manna_common::redis_pool::create_redis_pool;
use manna_engine::claim::DispatchClaim;
use manna_engine::{DispatchEngine, DocumentStore, PgDocumentStore, RetentionSweeper};
use manna_notifier::FcmGateway;
use manna_notifier::credentials::ServiceAccount;
use manna_trigger::listener::TriggerAdapter;
use manna_trigger::schedule::{ReplayScheduler, SweepScheduler};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "manna_trigger=info,manna_engine=info,manna_notifier=info".into()
            }),
        )
        .json()
        .init();

    tracing::info!("Manna push dispatcher starting...");

    // Load configuration
    let config = AppConfig::from_env()?;

    // Connect to database
    let pool = db::create_pool(&config.database_url, config.db_max_connections).await?;

    // Run migrations
    sqlx::migrate!("../../migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    // Push gateway
    let account = ServiceAccount::from_file(&config.fcm_credentials_path)?;
    let gateway = FcmGateway::new(
        account,
        config.fcm_project_id.clone(),
        Duration::from_secs(config.fcm_timeout_secs),
    )?
    .with_concurrency(config.fcm_concurrency);

    let store: Arc<dyn DocumentStore> = Arc::new(PgDocumentStore::new(pool.clone()));
    let engine = Arc::new(DispatchEngine::new(store.clone(), Arc::new(gateway)));

    let mut adapter = TriggerAdapter::new(store.clone(), engine, config.backlog_limit);
    match create_redis_pool(&config.redis_url).await {
        Ok(redis) => {
            adapter = adapter.with_claim(DispatchClaim::new(redis, config.dispatch_claim_ttl_secs));
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis unavailable, dispatching without in-flight claims");
        }
    }

    let scheduler = SweepScheduler::new(
        RetentionSweeper::new(store, config.retention_days),
        config.sweep_interval(),
    );
    let replayer = ReplayScheduler::new(adapter.clone(), config.replay_interval());

    // Subscribe first so nothing published during the replay is lost
    let listener = adapter.subscribe(&pool).await?;
    adapter.replay_backlog().await?;

    // Run with graceful shutdown on Ctrl+C
    tokio::select! {
        result = adapter.run(listener) => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Notification listener exited with error");
                return Err(e);
            }
        }
        _ = scheduler.run() => {}
        _ = replayer.run() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received shutdown signal, stopping gracefully...");
        }
    }

    tracing::info!("Manna push dispatcher stopped.");
    Ok(())
}
