//! Embedded-image upload and completion-tracking pipeline.
//!
//! The post use cases stage each inline image and publish an [`UploadJob`].
//! [`UploadWorker`] stores the file, rewrites the post content under a row
//! lock, and decrements the post's pending counter. The worker that brings
//! the counter to zero publishes [`ImagesCompleted`]. Orphaned files are
//! removed by [`DeleteWorker`].
//!
//! # Staging layout
//!
//! ```text
//! <service>:image:<image_id>      staged placeholder (inline src)
//! <service>:image:<post_id>       pending counter
//! <service>:processed:<image_id>  counted marker
//! ```

mod delete;
mod error;
mod keys;
mod memory;
mod messages;
pub mod ports;
mod upload;

#[cfg(test)]
pub(crate) mod fakes;
#[cfg(test)]
mod tests;
#[cfg(test)]
mod upload_props;

use std::time::Duration;

use scribe_shared::config::PipelineConfig;

pub use delete::DeleteWorker;
pub use error::PipelineError;
pub use keys::StagingKeys;
pub use memory::MemoryStagingStore;
pub use messages::{DeleteJob, ImagesCompleted, UploadJob};
pub use upload::{UploadOutcome, UploadWorker};

/// Runtime settings shared by the orchestrator and the workers.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    /// Staging key builder.
    pub keys: StagingKeys,
    /// Lifetime of staged payloads.
    pub staging_ttl: Duration,
    /// Lifetime of pending counters and processed markers.
    pub counter_ttl: Duration,
}

impl PipelineSettings {
    /// Build settings from configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            keys: StagingKeys::new(config.service_name.clone()),
            staging_ttl: Duration::from_secs(config.staging_ttl_secs),
            counter_ttl: Duration::from_secs(config.counter_ttl_secs),
        }
    }
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}
