//! Job publishing over Redis Streams.

use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use redis::streams::StreamMaxlen;
use scribe_core::pipeline::ports::JobPublisher;
use scribe_core::pipeline::{DeleteJob, ImagesCompleted, PipelineError, UploadJob};
use serde::Serialize;
use tracing::debug;

use crate::channel_error;
use crate::lanes::Lanes;

/// Field holding the JSON message of every stream entry.
pub(crate) const PAYLOAD_FIELD: &str = "payload";

/// Completion events are trimmed to roughly this many entries.
const EVENTS_MAXLEN: usize = 10_000;

/// Publishes jobs and events to the service's streams.
#[derive(Clone)]
pub struct RedisJobChannel {
    conn: ConnectionManager,
    lanes: Lanes,
}

impl RedisJobChannel {
    /// Create a channel publishing to `lanes`.
    #[must_use]
    pub fn new(conn: ConnectionManager, lanes: Lanes) -> Self {
        Self { conn, lanes }
    }

    async fn append<T: Serialize>(
        &self,
        stream: &str,
        message: &T,
        maxlen: Option<usize>,
    ) -> Result<String, PipelineError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| PipelineError::channel(format!("encode message: {e}")))?;
        let fields = [(PAYLOAD_FIELD, payload.as_str())];
        let mut conn = self.conn.clone();

        let id: String = match maxlen {
            Some(n) => conn
                .xadd_maxlen(stream, StreamMaxlen::Approx(n), "*", &fields)
                .await
                .map_err(channel_error)?,
            None => conn.xadd(stream, "*", &fields).await.map_err(channel_error)?,
        };
        debug!(stream, entry_id = %id, "message appended");
        Ok(id)
    }
}

impl JobPublisher for RedisJobChannel {
    async fn publish_upload(&self, job: &UploadJob) -> Result<(), PipelineError> {
        self.append(&self.lanes.upload(), job, None).await?;
        Ok(())
    }

    async fn publish_delete(&self, job: &DeleteJob) -> Result<(), PipelineError> {
        self.append(&self.lanes.delete(), job, None).await?;
        Ok(())
    }

    async fn publish_completed(&self, event: &ImagesCompleted) -> Result<(), PipelineError> {
        self.append(&self.lanes.completed(), event, Some(EVENTS_MAXLEN))
            .await?;
        Ok(())
    }
}
