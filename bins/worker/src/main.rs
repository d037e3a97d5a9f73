//! Scribe image worker
//!
//! Runs the upload and delete consumer pools until Ctrl-C or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use redis::aio::ConnectionManager;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scribe_core::pipeline::ports::JobHandler;
use scribe_core::pipeline::{DeleteWorker, PipelineSettings, UploadWorker};
use scribe_core::storage::{StorageConfig, StorageService};
use scribe_db::PostRepository;
use scribe_queue::{
    ConsumerSettings, Lanes, RedisJobChannel, RedisStagingStore, StreamConsumer, run_consumer,
};
use scribe_shared::AppConfig;
use scribe_shared::config::{LogConfig, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.log);

    let db = scribe_db::connect_with(&config.database).await?;
    info!("Connected to database");

    let redis = redis::Client::open(config.redis.url.as_str())?;
    let shared_conn = ConnectionManager::new(redis.clone()).await?;
    info!("Connected to Redis");

    let storage = StorageService::from_config(StorageConfig::from_settings(&config.storage))?;
    info!(provider = storage.provider_name(), "Object storage configured");

    let settings = PipelineSettings::from_config(&config.pipeline);
    let service = settings.keys.service().to_string();
    let lanes = Lanes::new(service.clone());
    let store = Arc::new(PostRepository::new(db));
    let staging = Arc::new(RedisStagingStore::new(shared_conn.clone()));
    let jobs = Arc::new(RedisJobChannel::new(shared_conn, lanes.clone()));
    let storage = Arc::new(storage);

    let uploads = Arc::new(UploadWorker::new(
        store,
        staging,
        jobs,
        Arc::clone(&storage),
        settings,
    ));
    let deletes = Arc::new(DeleteWorker::new(storage));

    let base_name = config
        .worker
        .consumer_name
        .clone()
        .unwrap_or_else(|| format!("worker-{}", std::process::id()));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut pool = JoinSet::new();

    spawn_pool(
        &mut pool,
        &redis,
        &config.worker,
        &lanes.upload(),
        &format!("{base_name}-upload"),
        config.worker.upload_concurrency,
        &uploads,
        &shutdown_rx,
    )
    .await?;
    spawn_pool(
        &mut pool,
        &redis,
        &config.worker,
        &lanes.delete(),
        &format!("{base_name}-delete"),
        config.worker.delete_concurrency,
        &deletes,
        &shutdown_rx,
    )
    .await?;
    info!(
        consumers = pool.len(),
        service = %service,
        "Worker pools started"
    );

    shutdown_signal().await;
    info!("Shutdown signal received, draining consumers");
    shutdown_tx.send(true).ok();

    while let Some(joined) = pool.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(err)) => error!(error = %err, "consumer exited with error"),
            Err(err) => error!(error = %err, "consumer task panicked"),
        }
    }

    info!("Worker stopped");
    Ok(())
}

fn init_tracing(log: &LogConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "scribe=debug".into());

    if log.json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

/// Spawn `count` consumers of `lane`, each on its own Redis connection.
#[allow(clippy::too_many_arguments)]
async fn spawn_pool<H>(
    pool: &mut JoinSet<Result<(), scribe_core::pipeline::PipelineError>>,
    redis: &redis::Client,
    worker: &WorkerConfig,
    lane: &str,
    name: &str,
    count: usize,
    handler: &Arc<H>,
    shutdown: &watch::Receiver<bool>,
) -> anyhow::Result<()>
where
    H: JobHandler + 'static,
{
    for i in 0..count.max(1) {
        let conn = ConnectionManager::new(redis.clone()).await?;
        let settings = ConsumerSettings::from_config(worker, format!("{name}-{i}"));
        let consumer = StreamConsumer::new(conn, lane, settings);
        pool.spawn(run_consumer(consumer, Arc::clone(handler), shutdown.clone()));
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
