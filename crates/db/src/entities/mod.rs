//! `SeaORM` entities.

pub mod images;
pub mod posts;
pub mod topics;
