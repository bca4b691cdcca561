//! Database module for SQLite persistence.
//!
//! Each topic and meeting is one row; list-valued fields are JSON text columns,
//! so every write replaces the whole document.

mod repository;

pub use repository::*;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

/// Connection pool size.
const MAX_CONNECTIONS: u32 = 5;

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS topics (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            tags TEXT NOT NULL DEFAULT '[]',
            description TEXT,
            votes INTEGER NOT NULL DEFAULT 0,
            user_added TEXT NOT NULL,
            votes_ledger TEXT NOT NULL DEFAULT '[]',
            added_date TEXT NOT NULL,
            version INTEGER NOT NULL DEFAULT 1
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meetings (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            date INTEGER NOT NULL,
            topic TEXT NOT NULL,
            leader TEXT NOT NULL,
            duration TEXT,
            description TEXT,
            tags TEXT NOT NULL DEFAULT '[]',
            useful_links TEXT NOT NULL DEFAULT '[]',
            resources_url TEXT,
            meeting_href TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    for statement in [
        "CREATE INDEX IF NOT EXISTS idx_topics_votes ON topics(votes)",
        "CREATE INDEX IF NOT EXISTS idx_meetings_topic ON meetings(topic)",
        "CREATE INDEX IF NOT EXISTS idx_meetings_date ON meetings(date)",
    ] {
        sqlx::query(statement).execute(pool).await?;
    }

    Ok(())
}
