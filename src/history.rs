//! Per-entry version history for structured documents.
//!
//! When a document is saved, [`collect_previous_versions`] compares the old
//! and new versions entry by entry and returns the old content of every
//! entry that changed. [`EntryHistoryStore::append`] persists those versions
//! under the document's scope key. It skips a version identical to the
//! newest stored one and trims each entry's timeline to the retention limit.
//!
//! Storage failures never reach the caller. They are logged and the
//! operation reports what it managed to do (an insert count or an empty
//! list), so a broken history database never blocks saving a document.

use serde_json::{Map, Value};
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::config::Config;
use crate::db;
use crate::document::{ensure_entry_uids, entries, entry_uid, Entry};
use crate::error::Result;
use crate::migrate;
use crate::models::{HistoryItem, HistorySource, PreviousVersion};
use crate::scope::build_scope_key;
use crate::snapshot::{snapshot, snapshot_hash, to_json};

pub const DEFAULT_HISTORY_LIMIT: usize = 7;
pub const MAX_HISTORY_LIMIT: usize = 100;

/// Clamp a requested retention limit into `1..=MAX_HISTORY_LIMIT`, falling
/// back to `default` when none was requested.
pub fn clamp_limit(limit: Option<i64>, default: i64) -> usize {
    let requested = limit.unwrap_or(default);
    requested.clamp(1, MAX_HISTORY_LIMIT as i64) as usize
}

/// Old versions of every entry that differs between `old` and `new`.
///
/// Entries in `new` are matched to `old` by uid. An entry whose uid is not
/// found falls back to the old entry at the same position, but only when
/// that old entry has no uid of its own. This covers documents saved before
/// uids existed. It can pair the wrong entries when uid-less entries are
/// reordered and edited in the same save.
pub fn collect_previous_versions(old: &Value, new: &Value) -> Vec<PreviousVersion> {
    let old_entries = entries(old);
    let new_entries = entries(new);
    if old_entries.is_empty() || new_entries.is_empty() {
        return Vec::new();
    }

    let mut old_by_uid: HashMap<String, &Entry> = HashMap::new();
    for &entry in &old_entries {
        if let Some(uid) = entry_uid(entry) {
            old_by_uid.entry(uid).or_insert(entry);
        }
    }

    let mut records = Vec::new();
    for (idx, new_entry) in new_entries.iter().enumerate() {
        let Some(uid) = entry_uid(new_entry) else {
            continue;
        };

        let matched = old_by_uid.get(&uid).copied().or_else(|| {
            old_entries
                .get(idx)
                .copied()
                .filter(|fallback| entry_uid(fallback).is_none())
        });
        let Some(old_entry) = matched else {
            continue;
        };

        let old_snapshot = snapshot(old_entry, Some(uid.as_str()));
        let new_snapshot = snapshot(new_entry, Some(uid.as_str()));
        if snapshot_hash(&old_snapshot) != snapshot_hash(&new_snapshot) {
            records.push(PreviousVersion {
                entry_uid: uid,
                snapshot: old_snapshot,
            });
        }
    }
    records
}

/// SQLite-backed entry history.
pub struct EntryHistoryStore {
    pool: SqlitePool,
    root: PathBuf,
    default_limit: i64,
}

impl EntryHistoryStore {
    /// Open the configured history database, creating the schema if needed.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        Self::with_pool(pool, config.base_dir().to_path_buf(), config.history.limit).await
    }

    /// Wrap an existing pool. `root` resolves relative document paths when
    /// building scope keys.
    pub async fn with_pool(pool: SqlitePool, root: PathBuf, default_limit: i64) -> Result<Self> {
        migrate::ensure_schema(&pool).await?;
        Ok(Self {
            pool,
            root,
            default_limit,
        })
    }

    pub fn scope_key(&self, source: &HistorySource) -> String {
        build_scope_key(
            &source.source_type,
            &source.source_id,
            &source.file_path,
            &self.root,
        )
    }

    /// Persist superseded entry versions. Returns how many rows were stored.
    ///
    /// Each insert and the trim that follows it commit together. Concurrent
    /// writers, in this process or another, queue on the database write
    /// lock for up to the busy timeout.
    pub async fn append(
        &self,
        source: &HistorySource,
        records: &[PreviousVersion],
        limit: Option<i64>,
    ) -> usize {
        let clean: Vec<(String, Map<String, Value>)> = records
            .iter()
            .filter_map(|rec| {
                let uid = rec.entry_uid.trim();
                (!uid.is_empty()).then(|| (uid.to_string(), snapshot(&rec.snapshot, Some(uid))))
            })
            .collect();
        if clean.is_empty() {
            return 0;
        }

        let scope_key = self.scope_key(source);
        let keep = clamp_limit(limit, self.default_limit);
        let mut inserted = 0;

        for (uid, snap) in &clean {
            match self.append_one(&scope_key, uid, snap, keep).await {
                Ok(true) => inserted += 1,
                Ok(false) => debug!(entry_uid = %uid, "history unchanged, skipped"),
                Err(e) => {
                    warn!(
                        source_type = %source.source_type,
                        entry_uid = %uid,
                        inserted,
                        "Append entry history failed: {}",
                        e
                    );
                    return inserted;
                }
            }
        }
        inserted
    }

    /// Store one version under a write transaction. Returns false when it
    /// matches the newest stored version.
    async fn append_one(
        &self,
        scope_key: &str,
        entry_uid: &str,
        snap: &Map<String, Value>,
        keep: usize,
    ) -> Result<bool> {
        let mut conn = self.pool.acquire().await?;
        // Take the write lock up front: a deferred read-to-write upgrade
        // fails with SQLITE_BUSY without waiting on the busy timeout.
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        // Stamped under the lock so timestamps follow commit order.
        let now = now_seconds();
        let outcome = write_version(&mut *conn, scope_key, entry_uid, snap, keep, now).await;
        let finish = match outcome {
            Ok(true) => "COMMIT",
            _ => "ROLLBACK",
        };
        if let Err(e) = sqlx::query(finish).execute(&mut *conn).await {
            // The transaction may still be open; drop the connection rather
            // than return it to the pool.
            let _ = conn.close().await;
            return Err(e.into());
        }
        outcome
    }

    /// Stored versions of one entry, newest first.
    pub async fn list(
        &self,
        source: &HistorySource,
        entry_uid: &str,
        limit: Option<i64>,
    ) -> Vec<HistoryItem> {
        let uid = entry_uid.trim();
        if uid.is_empty() {
            return Vec::new();
        }
        let scope_key = self.scope_key(source);
        let fetch = clamp_limit(limit, self.default_limit);

        match self.fetch(&scope_key, uid, fetch).await {
            Ok(items) => items,
            Err(e) => {
                warn!(entry_uid = %uid, "List entry history failed: {}", e);
                Vec::new()
            }
        }
    }

    async fn fetch(&self, scope_key: &str, entry_uid: &str, limit: usize) -> Result<Vec<HistoryItem>> {
        let rows = sqlx::query(
            r#"
            SELECT id, snapshot_json, created_at
            FROM entry_history
            WHERE scope_key = ? AND entry_uid = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(scope_key)
        .bind(entry_uid)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let raw: String = row.get("snapshot_json");
                HistoryItem {
                    id: row.get("id"),
                    created_at: row.get("created_at"),
                    snapshot: serde_json::from_str(&raw)
                        .unwrap_or_else(|_| Value::Object(Map::new())),
                }
            })
            .collect())
    }

    /// Save-time flow in one call: give `new` uids where missing, then
    /// record the old version of every entry the save changes.
    pub async fn capture_save(
        &self,
        source: &HistorySource,
        old: &Value,
        new: &mut Value,
        limit: Option<i64>,
    ) -> usize {
        ensure_entry_uids(new);
        let records = collect_previous_versions(old, new);
        if records.is_empty() {
            return 0;
        }
        self.append(source, &records, limit).await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

async fn write_version(
    conn: &mut SqliteConnection,
    scope_key: &str,
    entry_uid: &str,
    snap: &Map<String, Value>,
    keep: usize,
    now: f64,
) -> Result<bool> {
    let hash = snapshot_hash(snap);

    let head: Option<String> = sqlx::query_scalar(
        r#"
        SELECT snapshot_hash
        FROM entry_history
        WHERE scope_key = ? AND entry_uid = ?
        ORDER BY created_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(scope_key)
    .bind(entry_uid)
    .fetch_optional(&mut *conn)
    .await?;

    if head.as_deref() == Some(hash.as_str()) {
        return Ok(false);
    }

    sqlx::query(
        r#"
        INSERT INTO entry_history (scope_key, entry_uid, snapshot_json, snapshot_hash, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(scope_key)
    .bind(entry_uid)
    .bind(to_json(snap))
    .bind(&hash)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"
        DELETE FROM entry_history
        WHERE id IN (
            SELECT id
            FROM entry_history
            WHERE scope_key = ? AND entry_uid = ?
            ORDER BY created_at DESC, id DESC
            LIMIT -1 OFFSET ?
        )
        "#,
    )
    .bind(scope_key)
    .bind(entry_uid)
    .bind(keep as i64)
    .execute(&mut *conn)
    .await?;

    Ok(true)
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
