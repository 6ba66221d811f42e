//! SQLite persistence
//!
//! Stores item extraction state, per-page word boxes and link regions, and
//! user annotations (highlights, notes). Repositories borrow the shared
//! pool and keep SQL local to their table.

mod boxes;
mod highlights;
mod items;
mod links;
mod notes;
mod schema;

pub use boxes::*;
pub use highlights::*;
pub use items::*;
pub use links::*;
pub use notes::*;
pub use schema::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;

use crate::error::Result;

/// Create a new database connection pool
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    initialize_schema(&pool).await?;

    Ok(pool)
}
