//! Redis-backed staging store and job channel for Scribe.
//!
//! - [`RedisStagingStore`] implements the core `StagingStore` with `SET EX`,
//!   `SET NX EX`, and a Lua decrement that never creates a missing counter.
//! - [`RedisJobChannel`] publishes jobs and events to Redis Streams.
//! - [`StreamConsumer`] and [`run_consumer`] read a lane through a consumer
//!   group, acknowledge handled entries, and reclaim or dead-letter stuck ones.

mod channel;
mod consumer;
mod lanes;
mod staging;

use redis::RedisError;
use scribe_core::pipeline::PipelineError;

pub use channel::RedisJobChannel;
pub use consumer::{ConsumerSettings, StreamConsumer, run_consumer};
pub use lanes::{CONSUMER_GROUP, Lanes};
pub use staging::RedisStagingStore;

fn staging_error(err: RedisError) -> PipelineError {
    PipelineError::staging(err.to_string())
}

fn channel_error(err: RedisError) -> PipelineError {
    PipelineError::channel(err.to_string())
}
