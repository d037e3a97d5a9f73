//! Consumer-group reader for one stream lane.

use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::aio::ConnectionManager;
use redis::streams::{
    StreamClaimReply, StreamId, StreamPendingCountReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, RedisError};
use scribe_core::pipeline::PipelineError;
use scribe_core::pipeline::ports::JobHandler;
use scribe_shared::config::WorkerConfig;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::channel::PAYLOAD_FIELD;
use crate::channel_error;
use crate::lanes::{CONSUMER_GROUP, Lanes};

/// Pause after a failed read before trying again.
const READ_BACKOFF: Duration = Duration::from_secs(1);

/// Read and reclaim tuning of one consumer.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Consumer name inside the group.
    pub consumer: String,
    /// Entries fetched per read.
    pub batch_size: usize,
    /// Blocking read timeout in milliseconds.
    pub block_ms: usize,
    /// Idle time before a pending entry is reclaimed, in milliseconds.
    pub reclaim_idle_ms: usize,
    /// Deliveries after which an entry is dead-lettered.
    pub max_deliveries: usize,
}

impl ConsumerSettings {
    /// Build settings for a named consumer from worker config.
    #[must_use]
    pub fn from_config(config: &WorkerConfig, consumer: impl Into<String>) -> Self {
        Self {
            consumer: consumer.into(),
            batch_size: config.batch_size.max(1),
            block_ms: config.block_ms,
            reclaim_idle_ms: config.reclaim_idle_ms,
            max_deliveries: config.max_deliveries.max(1),
        }
    }

    fn reclaim_interval(&self) -> Duration {
        Duration::from_millis(u64::try_from(self.reclaim_idle_ms).unwrap_or(u64::MAX)) / 2
    }
}

/// A pending entry as reported by `XPENDING`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingEntry {
    id: String,
    deliveries: usize,
}

/// Split idle pending entries into those to retry and those to dead-letter.
fn partition_pending(
    entries: Vec<PendingEntry>,
    max_deliveries: usize,
) -> (Vec<String>, Vec<String>) {
    let (dead, retry): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|entry| entry.deliveries >= max_deliveries);
    (
        retry.into_iter().map(|e| e.id).collect(),
        dead.into_iter().map(|e| e.id).collect(),
    )
}

/// Reads one lane through the shared consumer group.
///
/// Each consumer needs its own connection: a blocking `XREADGROUP` holds the
/// connection until it returns.
pub struct StreamConsumer {
    conn: ConnectionManager,
    lane: String,
    settings: ConsumerSettings,
}

impl StreamConsumer {
    /// Create a consumer of `lane`.
    #[must_use]
    pub fn new(conn: ConnectionManager, lane: impl Into<String>, settings: ConsumerSettings) -> Self {
        Self {
            conn,
            lane: lane.into(),
            settings,
        }
    }

    /// Lane this consumer reads.
    #[must_use]
    pub fn lane(&self) -> &str {
        &self.lane
    }

    /// Create the consumer group (and the stream) if missing.
    pub async fn ensure_group(&mut self) -> Result<(), PipelineError> {
        let created = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.lane)
            .arg(CONSUMER_GROUP)
            .arg("0")
            .arg("MKSTREAM")
            .query_async::<_, ()>(&mut self.conn)
            .await;

        match created {
            Ok(()) => {
                info!(lane = %self.lane, group = CONSUMER_GROUP, "consumer group created");
                Ok(())
            }
            Err(err) if is_busy_group(&err) => Ok(()),
            Err(err) => Err(channel_error(err)),
        }
    }

    /// Read new entries, blocking up to the configured timeout.
    pub async fn read(&mut self) -> Result<Vec<StreamId>, PipelineError> {
        let options = StreamReadOptions::default()
            .group(CONSUMER_GROUP, &self.settings.consumer)
            .count(self.settings.batch_size)
            .block(self.settings.block_ms);

        let reply: Option<StreamReadReply> = self
            .conn
            .xread_options(&[&self.lane], &[">"], &options)
            .await
            .map_err(channel_error)?;

        Ok(reply
            .map(|r| r.keys.into_iter().flat_map(|key| key.ids).collect())
            .unwrap_or_default())
    }

    /// Acknowledge a handled entry.
    pub async fn ack(&mut self, id: &str) -> Result<(), PipelineError> {
        self.conn
            .xack::<_, _, _, ()>(&self.lane, CONSUMER_GROUP, &[id])
            .await
            .map_err(channel_error)
    }

    /// Claim entries idle past the reclaim threshold.
    ///
    /// Entries delivered `max_deliveries` times or more are moved to the
    /// lane's dead-letter stream and acknowledged. The rest are returned for
    /// another attempt by this consumer.
    pub async fn reclaim(&mut self) -> Result<Vec<StreamId>, PipelineError> {
        let pending: StreamPendingCountReply = self
            .conn
            .xpending_count(
                &self.lane,
                CONSUMER_GROUP,
                "-",
                "+",
                self.settings.batch_size,
            )
            .await
            .map_err(channel_error)?;

        let idle_ms = self.settings.reclaim_idle_ms;
        let idle: Vec<PendingEntry> = pending
            .ids
            .into_iter()
            .filter(|p| p.last_delivered_ms >= idle_ms)
            .map(|p| PendingEntry {
                id: p.id,
                deliveries: p.times_delivered,
            })
            .collect();
        if idle.is_empty() {
            return Ok(Vec::new());
        }

        let (retry, dead) = partition_pending(idle, self.settings.max_deliveries);

        for entry in self.claim(&dead).await? {
            self.dead_letter(&entry, "delivery limit reached").await?;
        }

        let claimed = self.claim(&retry).await?;
        if !claimed.is_empty() {
            debug!(lane = %self.lane, count = claimed.len(), "pending entries reclaimed");
        }
        Ok(claimed)
    }

    async fn claim(&mut self, ids: &[String]) -> Result<Vec<StreamId>, PipelineError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let reply: StreamClaimReply = self
            .conn
            .xclaim(
                &self.lane,
                CONSUMER_GROUP,
                &self.settings.consumer,
                self.settings.reclaim_idle_ms,
                ids,
            )
            .await
            .map_err(channel_error)?;
        Ok(reply.ids)
    }

    /// Copy an entry to the dead-letter stream and acknowledge it.
    pub async fn dead_letter(&mut self, entry: &StreamId, reason: &str) -> Result<(), PipelineError> {
        let payload: String = entry.get(PAYLOAD_FIELD).unwrap_or_default();
        let dead_lane = Lanes::dead_letter(&self.lane);
        self.conn
            .xadd::<_, _, _, _, String>(
                &dead_lane,
                "*",
                &[
                    (PAYLOAD_FIELD, payload.as_str()),
                    ("source_id", entry.id.as_str()),
                    ("reason", reason),
                ],
            )
            .await
            .map_err(channel_error)?;
        warn!(lane = %self.lane, entry_id = %entry.id, reason, "entry dead-lettered");
        self.ack(&entry.id).await
    }
}

fn is_busy_group(err: &RedisError) -> bool {
    err.code() == Some("BUSYGROUP")
}

/// Run a consumer until `shutdown` flips to `true` or its sender is dropped.
///
/// Entries are acknowledged when the handler succeeds or fails permanently.
/// Transient failures stay pending and come back through reclaim.
/// Undecodable entries are dead-lettered.
#[instrument(skip_all, fields(lane = %consumer.lane, consumer = %consumer.settings.consumer))]
pub async fn run_consumer<H>(
    mut consumer: StreamConsumer,
    handler: Arc<H>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), PipelineError>
where
    H: JobHandler,
{
    consumer.ensure_group().await?;
    info!("consumer started");

    let reclaim_every = consumer.settings.reclaim_interval();
    let mut last_reclaim = Instant::now();

    loop {
        if *shutdown.borrow() {
            break;
        }

        if last_reclaim.elapsed() >= reclaim_every {
            last_reclaim = Instant::now();
            match consumer.reclaim().await {
                Ok(entries) => {
                    for entry in entries {
                        dispatch(&mut consumer, handler.as_ref(), &entry).await;
                    }
                }
                Err(err) => warn!(error = %err, "reclaim failed"),
            }
        }

        let entries = tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
                continue;
            }
            read = consumer.read() => read,
        };

        match entries {
            Ok(entries) => {
                for entry in entries {
                    dispatch(&mut consumer, handler.as_ref(), &entry).await;
                }
            }
            Err(err) => {
                error!(error = %err, "read failed");
                tokio::time::sleep(READ_BACKOFF).await;
            }
        }
    }

    info!("consumer stopped");
    Ok(())
}

async fn dispatch<H: JobHandler>(consumer: &mut StreamConsumer, handler: &H, entry: &StreamId) {
    let decoded = entry
        .get::<String>(PAYLOAD_FIELD)
        .ok_or_else(|| "missing payload field".to_string())
        .and_then(|raw| serde_json::from_str::<H::Job>(&raw).map_err(|e| e.to_string()));

    let settled = match decoded {
        Err(reason) => {
            warn!(entry_id = %entry.id, reason = %reason, "undecodable entry");
            consumer.dead_letter(entry, &reason).await
        }
        Ok(job) => match handler.handle(job).await {
            Ok(()) => consumer.ack(&entry.id).await,
            Err(err) if err.is_permanent() => {
                warn!(entry_id = %entry.id, error = %err, "job failed permanently");
                consumer.ack(&entry.id).await
            }
            Err(err) => {
                warn!(entry_id = %entry.id, error = %err, "job failed, left pending");
                Ok(())
            }
        },
    };

    if let Err(err) = settled {
        error!(entry_id = %entry.id, error = %err, "failed to settle entry");
    }
}
