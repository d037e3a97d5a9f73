//! Object storage for post images using Apache OpenDAL.
//!
//! This module provides vendor-agnostic object storage with support for:
//! - S3-compatible: Cloudflare R2, Supabase Storage, AWS S3, DigitalOcean Spaces
//! - Azure Blob Storage
//! - Local filesystem (development only)
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      Apache OpenDAL                              │
//! │                   (Unified Storage API)                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ op.write_with("folder/name", bytes)   │ op.delete("folder/name") │
//! ├─────────────────────────────────────────────────────────────────┤
//! │          CdnPurger: POST {"url": ...} to the purge endpoint      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod cdn;
mod config;
mod error;
mod service;

pub use cdn::CdnPurger;
pub use config::{StorageConfig, StorageProvider};
pub use error::StorageError;
pub use service::StorageService;
