//! Post use cases.
//!
//! Plain CRUD lives in the db crate; this module covers the edits that
//! submit image jobs.

mod policy;
mod service;
mod types;


pub use policy::ImagePolicy;
pub use service::PostService;
pub use types::{CreatePostInput, Post, PostSubmission, Topic, UpdatePostInput};
