//! Directory-level backups of the configured resource folders.
//!
//! Each backup is a directory `<root>/<YYYYMMDD_HHMMSS>/` holding one
//! subdirectory per resource type plus a `metadata.json` describing it.
//!
//! - **Full** backups copy every file of each resource folder.
//! - **Incremental** backups copy only files modified after the newest
//!   existing backup in the same root, plus files reported to the
//!   [`ChangeTracker`]. They are additive: unchanged files are simply absent
//!   from the archive.
//!
//! After every successful backup, archives older than the retention window
//! are deleted. All engine operations take one engine-wide lock, so a backup,
//! a restore and a delete never touch the backup tree at the same time.

use chrono::{DateTime, Duration, Local, NaiveDateTime, TimeZone};
use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use crate::config::{save_config, Config};
use crate::error::{Result, VaultError};
use crate::models::{bytes_to_mb, BackupRecord, ResourceType};
use crate::schedule::ScheduleConfig;
use crate::tracker::ChangeTracker;

pub const METADATA_FILE: &str = "metadata.json";
const BACKUP_ID_FORMAT: &str = "%Y%m%d_%H%M%S";
const RESTORE_SIDECAR_SUFFIX: &str = ".restore_backup";

/// What to back up and where.
#[derive(Debug, Clone, Default)]
pub struct BackupRequest {
    /// Resource types to include. `None` means all of them.
    pub resources: Option<Vec<ResourceType>>,
    /// Backup root. `None` means the configured `[backup].path`.
    pub destination: Option<PathBuf>,
    pub incremental: bool,
}

/// Lifecycle of the most recent backup run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackupPhase {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    pub files: u64,
    pub bytes: u64,
}

impl std::ops::AddAssign for CopyStats {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.bytes += other.bytes;
    }
}

pub struct BackupEngine {
    config: RwLock<Config>,
    config_path: Option<PathBuf>,
    tracker: ChangeTracker,
    phase: RwLock<BackupPhase>,
    lock: Mutex<()>,
}

impl BackupEngine {
    pub fn new(config: Config) -> Self {
        Self {
            config: RwLock::new(config),
            config_path: None,
            tracker: ChangeTracker::new(),
            phase: RwLock::new(BackupPhase::Idle),
            lock: Mutex::new(()),
        }
    }

    /// Persist schedule changes to the TOML file at `path`.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn phase(&self) -> BackupPhase {
        *self.phase.read()
    }

    pub fn track_change(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        timestamp_ms: Option<i64>,
    ) {
        self.tracker
            .record_change(resource_type, resource_id, timestamp_ms);
    }

    pub fn schedule(&self) -> ScheduleConfig {
        self.config.read().backup.schedule_config()
    }

    /// Replace the schedule. The configuration file is rewritten first; the
    /// in-memory schedule only changes once that succeeded.
    pub fn set_schedule(&self, schedule: ScheduleConfig) -> Result<()> {
        schedule.validate().map_err(VaultError::ConfigInvalid)?;

        let mut updated = self.config.read().clone();
        updated.backup.apply_schedule(&schedule);
        if let Some(path) = &self.config_path {
            save_config(path, &updated)
                .map_err(|e| VaultError::ConfigInvalid(format!("{:#}", e)))?;
        }
        *self.config.write() = updated;
        info!(
            kind = %schedule.kind,
            hour = schedule.hour,
            retention_days = schedule.retention_days,
            "backup schedule updated"
        );
        Ok(())
    }

    /// Run one backup. Blocks while another engine operation is running.
    pub fn trigger_backup(&self, request: &BackupRequest) -> Result<BackupRecord> {
        let _guard = self.lock.lock();
        *self.phase.write() = BackupPhase::Running;

        let config = self.config.read().clone();
        let root = request
            .destination
            .clone()
            .unwrap_or_else(|| config.backup_root());

        let result = self.run_backup(&config, &root, request);
        match &result {
            Ok(record) => {
                *self.phase.write() = BackupPhase::Completed;
                info!(
                    id = %record.id,
                    files = record.file_count,
                    size_mb = record.size_mb,
                    incremental = record.incremental,
                    "backup complete: {}",
                    record.storage_path.display()
                );
                if let Err(e) = cleanup_in(&root, config.backup.retention_days, Local::now()) {
                    warn!("retention cleanup of {} failed: {}", root.display(), e);
                }
            }
            Err(e) => {
                *self.phase.write() = BackupPhase::Failed;
                error!("backup failed: {}", e);
            }
        }
        result
    }

    fn run_backup(
        &self,
        config: &Config,
        root: &Path,
        request: &BackupRequest,
    ) -> Result<BackupRecord> {
        let started = Local::now();
        fs::create_dir_all(root)?;

        // Read before the new directory exists so it cannot count as "previous".
        let since = read_backups(root).into_iter().map(|r| r.created_at).max();
        let (id, backup_dir) = allocate_backup_dir(root, started)?;

        let mut wanted = request
            .resources
            .clone()
            .unwrap_or_else(|| ResourceType::ALL.to_vec());
        let mut seen = HashSet::new();
        wanted.retain(|rt| seen.insert(*rt));

        let mut totals = CopyStats::default();
        let mut backed_up = Vec::new();
        for resource in wanted {
            let Some(source) = config.resource_dir(resource) else {
                warn!(resource = %resource, "no directory configured, skipping");
                continue;
            };
            if !source.is_dir() {
                warn!(resource = %resource, "{}", VaultError::SourceMissing(source));
                continue;
            }

            let target = backup_dir.join(resource.as_str());
            let copied = if request.incremental {
                let changed = self.tracker.changed_ids(resource);
                incremental_copy(&source, &target, since, &changed)
            } else {
                full_copy(&source, &target)
            };
            match copied {
                Ok(stats) => {
                    debug!(resource = %resource, files = stats.files, bytes = stats.bytes, "copied");
                    totals += stats;
                    backed_up.push(resource);
                }
                Err(e) => error!(resource = %resource, "backup of {} failed: {}", source.display(), e),
            }
        }

        let record = BackupRecord {
            id,
            created_at: started,
            resources: backed_up,
            file_count: totals.files,
            size_bytes: totals.bytes,
            size_mb: bytes_to_mb(totals.bytes),
            incremental: request.incremental,
            storage_path: backup_dir.clone(),
        };
        let json = serde_json::to_string_pretty(&record)?;
        fs::write(backup_dir.join(METADATA_FILE), json)?;
        Ok(record)
    }

    /// Backups under the configured root, newest first.
    pub fn list_backups(&self) -> Vec<BackupRecord> {
        let _guard = self.lock.lock();
        let root = self.config.read().backup_root();
        read_backups(&root)
    }

    /// Put the contents of backup `backup_id` back into the live resource
    /// directories. Returns the resource types restored.
    ///
    /// Each live directory is first renamed to a `.restore_backup` sibling
    /// and only removed once the copy succeeded. If the copy fails the
    /// sibling stays on disk and the error names it.
    pub fn restore_backup(&self, backup_id: &str) -> Result<Vec<ResourceType>> {
        let _guard = self.lock.lock();
        let config = self.config.read().clone();
        let backup_dir = existing_backup_dir(&config.backup_root(), backup_id)?;

        let metadata_path = backup_dir.join(METADATA_FILE);
        let resources = if metadata_path.is_file() {
            read_metadata(&metadata_path)?.resources
        } else {
            ResourceType::ALL.to_vec()
        };

        let mut restored = Vec::new();
        for resource in resources {
            let source = backup_dir.join(resource.as_str());
            if !source.is_dir() {
                continue;
            }
            let Some(target) = config.resource_dir(resource) else {
                warn!(resource = %resource, "no directory configured, not restoring");
                continue;
            };
            restore_dir(resource, &source, &target)?;
            restored.push(resource);
        }

        info!(id = backup_id, "restore complete: {:?}", restored);
        Ok(restored)
    }

    pub fn delete_backup(&self, backup_id: &str) -> Result<()> {
        let _guard = self.lock.lock();
        let root = self.config.read().backup_root();
        let backup_dir = existing_backup_dir(&root, backup_id)?;
        fs::remove_dir_all(&backup_dir)?;
        info!(id = backup_id, "backup deleted");
        Ok(())
    }

    /// Delete archives under `root` older than the retention window.
    /// Returns how many were removed.
    pub fn cleanup_old_backups(&self, root: &Path) -> Result<usize> {
        let _guard = self.lock.lock();
        let retention_days = self.config.read().backup.retention_days;
        cleanup_in(root, retention_days, Local::now())
    }
}

fn allocate_backup_dir(root: &Path, started: DateTime<Local>) -> Result<(String, PathBuf)> {
    let base = started.format(BACKUP_ID_FORMAT).to_string();
    let mut id = base.clone();
    let mut n = 1;
    while root.join(&id).exists() {
        id = format!("{}_{}", base, n);
        n += 1;
    }
    let dir = root.join(&id);
    fs::create_dir(&dir)?;
    Ok((id, dir))
}

fn existing_backup_dir(root: &Path, backup_id: &str) -> Result<PathBuf> {
    let id = backup_id.trim();
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && !id.contains('/')
        && !id.contains('\\');
    let dir = root.join(id);
    if !valid || !dir.is_dir() {
        return Err(VaultError::NotFound(format!("backup {}", backup_id)));
    }
    Ok(dir)
}

fn read_metadata(path: &Path) -> Result<BackupRecord> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Record for the backup directory `dir`: its metadata, or a minimal record
/// derived from the directory name and mtime when there is none.
fn record_for_dir(dir: &Path) -> Result<BackupRecord> {
    let metadata_path = dir.join(METADATA_FILE);
    if metadata_path.is_file() {
        return read_metadata(&metadata_path);
    }

    let id = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let created_at = match parse_backup_id(&id) {
        Some(ts) => ts,
        None => DateTime::<Local>::from(fs::metadata(dir)?.modified()?),
    };
    Ok(BackupRecord {
        id,
        created_at,
        resources: Vec::new(),
        file_count: 0,
        size_bytes: 0,
        size_mb: 0.0,
        incremental: false,
        storage_path: dir.to_path_buf(),
    })
}

fn parse_backup_id(id: &str) -> Option<DateTime<Local>> {
    let stamp = id.get(..15)?;
    let naive = NaiveDateTime::parse_from_str(stamp, BACKUP_ID_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}

/// Every backup under `root`, newest first. Unreadable metadata is logged
/// and the directory left out.
pub fn read_backups(root: &Path) -> Vec<BackupRecord> {
    let Ok(dir) = fs::read_dir(root) else {
        return Vec::new();
    };

    let mut records: Vec<BackupRecord> = dir
        .flatten()
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| match record_for_dir(&entry.path()) {
            Ok(record) => Some(record),
            Err(e) => {
                error!("failed to read backup {}: {}", entry.path().display(), e);
                None
            }
        })
        .collect();

    records.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });
    records
}

fn cleanup_in(root: &Path, retention_days: u32, now: DateTime<Local>) -> Result<usize> {
    if retention_days == 0 || !root.is_dir() {
        return Ok(0);
    }
    let cutoff = now - Duration::days(i64::from(retention_days));

    let mut removed = 0;
    for entry in fs::read_dir(root)?.flatten() {
        let dir = entry.path();
        if !dir.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();

        let created_at = match backup_time(&dir) {
            Ok(ts) => ts,
            Err(e) => {
                error!("cleanup: cannot date backup {}: {}", name, e);
                continue;
            }
        };
        if created_at >= cutoff {
            continue;
        }
        match fs::remove_dir_all(&dir) {
            Ok(()) => {
                info!("removed expired backup: {}", name);
                removed += 1;
            }
            Err(e) => error!("cleanup: failed to remove {}: {}", name, e),
        }
    }
    Ok(removed)
}

/// Metadata timestamp when present, otherwise the directory mtime.
fn backup_time(dir: &Path) -> Result<DateTime<Local>> {
    let metadata_path = dir.join(METADATA_FILE);
    if metadata_path.is_file() {
        return Ok(read_metadata(&metadata_path)?.created_at);
    }
    Ok(DateTime::<Local>::from(fs::metadata(dir)?.modified()?))
}

fn relative<'a>(path: &'a Path, base: &Path) -> Result<&'a Path> {
    path.strip_prefix(base).map_err(|_| {
        VaultError::InvalidInput(format!(
            "{} is outside {}",
            path.display(),
            base.display()
        ))
    })
}

/// Copy the tree at `source` to `target`, creating directories as needed.
/// Symlinked files are copied as regular files.
pub fn copy_tree(source: &Path, target: &Path) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    fs::create_dir_all(target)?;
    for entry in WalkDir::new(source) {
        let entry = entry?;
        let dest = target.join(relative(entry.path(), source)?);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else if entry.path().is_file() {
            stats.bytes += fs::copy(entry.path(), &dest)?;
            stats.files += 1;
        }
    }
    Ok(stats)
}

/// File count and total size of the tree at `dir`.
pub fn tree_stats(dir: &Path) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    for entry in WalkDir::new(dir) {
        let entry = entry?;
        if entry.file_type().is_file() {
            stats.files += 1;
            stats.bytes += entry.metadata()?.len();
        }
    }
    Ok(stats)
}

fn full_copy(source: &Path, target: &Path) -> Result<CopyStats> {
    if target.exists() {
        fs::remove_dir_all(target)?;
    }
    copy_tree(source, target)?;
    tree_stats(target)
}

/// Copy files changed since `since` or named in `changed`. With no previous
/// backup (`since == None`) everything is copied.
fn incremental_copy(
    source: &Path,
    target: &Path,
    since: Option<DateTime<Local>>,
    changed: &HashSet<String>,
) -> Result<CopyStats> {
    let mut stats = CopyStats::default();
    fs::create_dir_all(target)?;

    for entry in WalkDir::new(source) {
        let entry = entry?;
        if !entry.path().is_file() {
            continue;
        }
        let modified = DateTime::<Local>::from(entry.path().metadata()?.modified()?);
        let name = entry.file_name().to_string_lossy();
        let should_copy = match since {
            None => true,
            Some(last) => modified > last || changed.contains(&*name),
        };
        if !should_copy {
            continue;
        }

        let dest = target.join(relative(entry.path(), source)?);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        stats.bytes += fs::copy(entry.path(), &dest)?;
        stats.files += 1;
    }
    Ok(stats)
}

fn sidecar_path(target: &Path) -> PathBuf {
    let mut name = target
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(RESTORE_SIDECAR_SUFFIX);
    target.with_file_name(name)
}

fn restore_dir(resource: ResourceType, source: &Path, target: &Path) -> Result<()> {
    let sidecar = sidecar_path(target);
    let had_live = target.exists();
    if had_live {
        if sidecar.exists() {
            warn!("replacing stale restore sidecar {}", sidecar.display());
            fs::remove_dir_all(&sidecar)?;
        }
        fs::rename(target, &sidecar)?;
    }

    if let Err(e) = copy_tree(source, target) {
        if had_live {
            error!(
                resource = %resource,
                "restore copy failed, previous data kept at {}",
                sidecar.display()
            );
            return Err(VaultError::RestoreFailed {
                resource: resource.to_string(),
                sidecar,
                source: Box::new(e),
            });
        }
        return Err(e);
    }

    if had_live {
        if let Err(e) = fs::remove_dir_all(&sidecar) {
            warn!("could not remove {}: {}", sidecar.display(), e);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_record(root: &Path, id: &str, created_at: DateTime<Local>) {
        let dir = root.join(id);
        fs::create_dir_all(&dir).unwrap();
        let record = BackupRecord {
            id: id.to_string(),
            created_at,
            resources: vec![ResourceType::Characters],
            file_count: 1,
            size_bytes: 1,
            size_mb: bytes_to_mb(1),
            incremental: false,
            storage_path: dir.clone(),
        };
        fs::write(
            dir.join(METADATA_FILE),
            serde_json::to_string(&record).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn test_cleanup_uses_retention_window() {
        let tmp = TempDir::new().unwrap();
        let now = Local::now();
        write_record(tmp.path(), "old", now - Duration::days(31));
        write_record(tmp.path(), "recent", now - Duration::days(29));

        assert_eq!(cleanup_in(tmp.path(), 30, now).unwrap(), 1);
        assert!(!tmp.path().join("old").exists());
        assert!(tmp.path().join("recent").exists());
    }

    #[test]
    fn test_cleanup_disabled_with_zero_days() {
        let tmp = TempDir::new().unwrap();
        let now = Local::now();
        write_record(tmp.path(), "ancient", now - Duration::days(3650));
        assert_eq!(cleanup_in(tmp.path(), 0, now).unwrap(), 0);
        assert!(tmp.path().join("ancient").exists());
    }

    #[test]
    fn test_read_backups_synthesizes_legacy_records() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("20240101_120000")).unwrap();
        write_record(tmp.path(), "20240301_080000", Local::now());

        let records = read_backups(tmp.path());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "20240301_080000");
        let legacy = &records[1];
        assert_eq!(legacy.id, "20240101_120000");
        assert!(legacy.is_legacy());
        assert_eq!(
            legacy.created_at.format(BACKUP_ID_FORMAT).to_string(),
            "20240101_120000"
        );
    }

    #[test]
    fn test_allocate_backup_dir_never_reuses_ids() {
        let tmp = TempDir::new().unwrap();
        let now = Local::now();
        let (a, _) = allocate_backup_dir(tmp.path(), now).unwrap();
        let (b, _) = allocate_backup_dir(tmp.path(), now).unwrap();
        assert_ne!(a, b);
        assert!(b.starts_with(&a));
        assert!(b > a);
    }

    #[test]
    fn test_existing_backup_dir_rejects_traversal() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path().join("backups");
        fs::create_dir_all(&root).unwrap();
        for id in ["..", ".", "", "../backups", "a/b"] {
            assert!(matches!(
                existing_backup_dir(&root, id),
                Err(VaultError::NotFound(_))
            ));
        }
    }

    #[test]
    fn test_sidecar_path_is_sibling() {
        let sidecar = sidecar_path(Path::new("/data/user/characters"));
        assert_eq!(sidecar, PathBuf::from("/data/user/characters.restore_backup"));
    }

    #[test]
    fn test_failed_restore_keeps_sidecar() {
        let tmp = TempDir::new().unwrap();
        let live = tmp.path().join("characters");
        fs::create_dir_all(&live).unwrap();
        fs::write(live.join("alice.png"), "original").unwrap();

        let unreadable = tmp.path().join("archive/characters-gone");
        let err = restore_dir(ResourceType::Characters, &unreadable, &live).unwrap_err();

        let sidecar = sidecar_path(&live);
        match err {
            VaultError::RestoreFailed {
                resource, sidecar: named, ..
            } => {
                assert_eq!(resource, "characters");
                assert_eq!(named, sidecar);
            }
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(
            fs::read_to_string(sidecar.join("alice.png")).unwrap(),
            "original"
        );
    }

    #[test]
    fn test_copy_tree_counts_nested_files() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        fs::create_dir_all(src.join("nested/deeper")).unwrap();
        fs::write(src.join("a.txt"), "aaa").unwrap();
        fs::write(src.join("nested/deeper/b.txt"), "bb").unwrap();

        let dst = tmp.path().join("dst");
        let stats = copy_tree(&src, &dst).unwrap();
        assert_eq!(stats, CopyStats { files: 2, bytes: 5 });
        assert_eq!(tree_stats(&dst).unwrap(), stats);
        assert_eq!(fs::read_to_string(dst.join("nested/deeper/b.txt")).unwrap(), "bb");
    }
}
