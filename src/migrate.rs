//! Schema creation for the entry-history table.
//!
//! Idempotent: `lv init` runs it explicitly and the history store runs it
//! again every time it opens, so an older database picks up the index.

use sqlx::SqlitePool;
use tracing::debug;

use crate::config::Config;
use crate::db;
use crate::error::Result;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    ensure_schema(&pool).await?;
    pool.close().await;
    Ok(())
}

pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS entry_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            scope_key TEXT NOT NULL,
            entry_uid TEXT NOT NULL,
            snapshot_json TEXT NOT NULL,
            snapshot_hash TEXT NOT NULL,
            created_at REAL NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_entry_history_scope_uid_time
        ON entry_history(scope_key, entry_uid, created_at DESC, id DESC)
        "#,
    )
    .execute(pool)
    .await?;

    debug!("entry_history schema ready");
    Ok(())
}
