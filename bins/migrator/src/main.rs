//! Database migration runner for Scribe.
//!
//! Usage:
//!   migrator up      - Apply the topics, posts, and images schema
//!   migrator down    - Roll back the last migration
//!   migrator status  - Show migration status
//!   migrator fresh   - Drop all tables and re-run migrations
//!
//! Reads `DATABASE_URL` from the environment or `.env`.

use sea_orm_migration::prelude::*;
use scribe_db::migration::Migrator;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    cli::run_cli(Migrator).await;
}
