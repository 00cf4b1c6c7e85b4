use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};

use crate::error::Result;

pub const DB_FILE: &str = "index.sqlite";

pub fn db_path(persist_path: &Path) -> PathBuf {
    persist_path.join(DB_FILE)
}

/// Open (creating if needed) the index database under `persist_path`.
pub async fn connect(persist_path: &Path) -> Result<SqlitePool> {
    std::fs::create_dir_all(persist_path)?;

    let options = SqliteConnectOptions::new()
        .filename(db_path(persist_path))
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    Ok(pool)
}
