//! Repository abstractions for data access.
//!
//! Repositories provide a clean interface for database operations,
//! hiding the `SeaORM` implementation details from the rest of the application.

pub mod listing;
pub mod post;
pub mod topic;

pub use listing::{PostFilter, PostListItem, PostPredicate, PostSortField};
pub use post::{LockedPostRow, PostRepository};
pub use topic::TopicRepository;
