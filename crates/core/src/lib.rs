//! Core logic for the Scribe post image pipeline.
//!
//! This crate contains pure pipeline logic with ZERO database or queue dependencies.
//! Persistence, staging, and job transport are reached through traits in
//! [`pipeline::ports`] that the db and queue crates implement.
//!
//! # Modules
//!
//! - `content` - Inline image extraction, placeholder rewriting, slugs
//! - `image` - Image records and the create/update diff planner
//! - `pipeline` - Job messages, staging keys, upload and delete workers
//! - `post` - Post use cases that submit image jobs
//! - `storage` - OpenDAL object storage and CDN purge

pub mod content;
pub mod image;
pub mod pipeline;
pub mod post;
pub mod storage;
