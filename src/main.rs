//! # LoreVault CLI (`lv`)
//!
//! The `lv` binary drives backups of the resource folders and the entry
//! history store from the command line.
//!
//! ## Usage
//!
//! ```bash
//! lv --config ./config/lorevault.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lv init` | Create the history database and the backup root |
//! | `lv backup run` | Take a full or incremental backup |
//! | `lv backup list` | List backups, newest first |
//! | `lv backup restore <id>` | Restore the live folders from a backup |
//! | `lv backup delete <id>` | Delete one backup |
//! | `lv backup cleanup` | Delete backups past the retention window |
//! | `lv schedule show\|set\|next` | Inspect or change the backup schedule |
//! | `lv history capture` | Record the entries an edit is about to replace |
//! | `lv history list` | Show stored versions of one entry |
//! | `lv uids ensure <file>` | Give every entry of a document a stable uid |
//!
//! Log output goes to stderr and is controlled by `RUST_LOG`
//! (for example `RUST_LOG=lorevault=debug`).

use anyhow::Context;
use chrono::Local;
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use lorevault::backup::{BackupEngine, BackupRequest};
use lorevault::config::{self, Config};
use lorevault::document::ensure_entry_uids;
use lorevault::history::EntryHistoryStore;
use lorevault::migrate;
use lorevault::models::{HistorySource, ResourceType};
use lorevault::schedule::ScheduleKind;

/// LoreVault CLI: backups and entry history for creative-writing assets.
#[derive(Parser)]
#[command(
    name = "lv",
    about = "LoreVault: backups and entry history for character cards, worldbooks and presets",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/lorevault.toml`. Relative paths inside it
    /// resolve against the file's directory (or its `root` setting).
    #[arg(long, global = true, default_value = "./config/lorevault.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the history database and the backup root.
    ///
    /// Idempotent; running it again is safe.
    Init,

    /// Take, list, restore and prune backups.
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },

    /// Inspect or change the automatic backup schedule.
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Per-entry version history of structured documents.
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Entry identity maintenance.
    Uids {
        #[command(subcommand)]
        action: UidsAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    /// Take a backup now.
    Run {
        /// Resource type to include (repeatable). Defaults to all types.
        #[arg(long = "resource")]
        resources: Vec<ResourceType>,

        /// Backup root to write into instead of `[backup].path`.
        #[arg(long)]
        dest: Option<PathBuf>,

        /// Copy only files changed since the newest backup in the root.
        #[arg(long)]
        incremental: bool,

        /// Mark a file as changed, as `TYPE:FILENAME` (repeatable).
        #[arg(long = "changed", value_parser = parse_change)]
        changed: Vec<(ResourceType, String)>,
    },
    /// List backups under `[backup].path`, newest first.
    List,
    /// Replace the live resource folders with the contents of a backup.
    Restore { id: String },
    /// Delete one backup.
    Delete { id: String },
    /// Delete backups older than the retention window.
    Cleanup {
        /// Backup root to prune instead of `[backup].path`.
        #[arg(long)]
        dest: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// Print the current schedule.
    Show,
    /// Change schedule fields; omitted fields keep their value.
    Set {
        #[arg(long)]
        enabled: Option<bool>,
        /// `disabled`, `daily` or `weekly`.
        #[arg(long = "type")]
        kind: Option<ScheduleKind>,
        /// Hour of day, 0-23.
        #[arg(long)]
        hour: Option<u32>,
        /// Day of week for weekly schedules, 0 = Sunday .. 6 = Saturday.
        #[arg(long)]
        day_of_week: Option<u32>,
        /// Delete backups older than this many days; 0 keeps everything.
        #[arg(long)]
        retention_days: Option<u32>,
    },
    /// Print when the next scheduled backup would run.
    Next,
}

#[derive(Subcommand)]
enum HistoryAction {
    /// Record the previous versions of entries changed by an edit.
    ///
    /// Compares `--old` against `--new` and stores the old version of every
    /// entry whose content changed.
    Capture {
        #[arg(long)]
        source_type: String,
        #[arg(long)]
        source_id: String,
        /// Path of the document being edited; part of the history scope.
        #[arg(long)]
        file: String,
        /// Document before the edit.
        #[arg(long)]
        old: PathBuf,
        /// Document after the edit.
        #[arg(long)]
        new: PathBuf,
        /// Write uids assigned to the new document back to `--new`.
        #[arg(long)]
        write_uids: bool,
        /// Versions to keep per entry (1-100).
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Print stored versions of one entry as JSON, newest first.
    List {
        #[arg(long)]
        source_type: String,
        #[arg(long)]
        source_id: String,
        #[arg(long)]
        file: String,
        #[arg(long)]
        uid: String,
        #[arg(long)]
        limit: Option<i64>,
    },
}

#[derive(Subcommand)]
enum UidsAction {
    /// Assign missing or duplicate entry uids in a document, in place.
    Ensure { path: PathBuf },
}

/// Parse a `TYPE:ID` pair for `--changed` arguments.
fn parse_change(s: &str) -> Result<(ResourceType, String), String> {
    let pos = s
        .find(':')
        .ok_or_else(|| format!("invalid TYPE:ID: no ':' found in '{}'", s))?;
    let resource = s[..pos].parse::<ResourceType>()?;
    let id = s[pos + 1..].trim();
    if id.is_empty() {
        return Err(format!("invalid TYPE:ID: empty id in '{}'", s));
    }
    Ok((resource, id.to_string()))
}

fn read_document(path: &Path) -> anyhow::Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_document(path: &Path, document: &Value) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(document)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn engine(cfg: Config, config_path: &Path) -> BackupEngine {
    BackupEngine::new(cfg).with_config_path(config_path)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    if let Commands::Uids {
        action: UidsAction::Ensure { path },
    } = &cli.command
    {
        let mut document = read_document(path)?;
        if ensure_entry_uids(&mut document) {
            write_document(path, &document)?;
            println!("Assigned entry uids in {}", path.display());
        } else {
            println!("All entries already have unique uids.");
        }
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            std::fs::create_dir_all(cfg.backup_root())?;
            println!("Database initialized successfully.");
            println!("Backups will be written to {}", cfg.backup_root().display());
        }
        Commands::Backup { action } => run_backup_action(cfg, &cli.config, action)?,
        Commands::Schedule { action } => run_schedule_action(cfg, &cli.config, action)?,
        Commands::History { action } => run_history_action(&cfg, action).await?,
        Commands::Uids { .. } => unreachable!(),
    }

    Ok(())
}

fn run_backup_action(cfg: Config, config_path: &Path, action: BackupAction) -> anyhow::Result<()> {
    let default_root = cfg.backup_root();
    let engine = engine(cfg, config_path);

    match action {
        BackupAction::Run {
            resources,
            dest,
            incremental,
            changed,
        } => {
            for (resource, id) in &changed {
                engine.track_change(*resource, id, None);
            }
            let request = BackupRequest {
                resources: (!resources.is_empty()).then_some(resources),
                destination: dest,
                incremental,
            };
            let record = engine.trigger_backup(&request)?;
            println!(
                "Backup {} ({}): {} files, {:.2} MB",
                record.id,
                if record.incremental { "incremental" } else { "full" },
                record.file_count,
                record.size_mb
            );
            let names: Vec<&str> = record.resources.iter().map(|r| r.as_str()).collect();
            println!("  resources: {}", names.join(", "));
            println!("  path: {}", record.storage_path.display());
        }
        BackupAction::List => {
            let backups = engine.list_backups();
            if backups.is_empty() {
                println!("No backups in {}", default_root.display());
            }
            for record in backups {
                let kind = if record.is_legacy() {
                    "legacy"
                } else if record.incremental {
                    "incremental"
                } else {
                    "full"
                };
                println!(
                    "{}  {}  {:>11}  {:>6} files  {:>8.2} MB",
                    record.id,
                    record.created_at.format("%Y-%m-%d %H:%M:%S"),
                    kind,
                    record.file_count,
                    record.size_mb
                );
            }
        }
        BackupAction::Restore { id } => {
            let restored = engine.restore_backup(&id)?;
            if restored.is_empty() {
                println!("Backup {} contained nothing to restore.", id);
            }
            for resource in restored {
                println!("Restored {}", resource);
            }
        }
        BackupAction::Delete { id } => {
            engine.delete_backup(&id)?;
            println!("Deleted backup {}", id);
        }
        BackupAction::Cleanup { dest } => {
            let root = dest.unwrap_or(default_root);
            let removed = engine.cleanup_old_backups(&root)?;
            println!("Removed {} expired backup(s) from {}", removed, root.display());
        }
    }
    Ok(())
}

fn run_schedule_action(
    cfg: Config,
    config_path: &Path,
    action: ScheduleAction,
) -> anyhow::Result<()> {
    let engine = engine(cfg, config_path);

    match action {
        ScheduleAction::Show => {
            println!("{}", serde_json::to_string_pretty(&engine.schedule())?);
        }
        ScheduleAction::Set {
            enabled,
            kind,
            hour,
            day_of_week,
            retention_days,
        } => {
            let mut schedule = engine.schedule();
            if let Some(v) = enabled {
                schedule.enabled = v;
            }
            if let Some(v) = kind {
                schedule.kind = v;
            }
            if let Some(v) = hour {
                schedule.hour = v;
            }
            if let Some(v) = day_of_week {
                schedule.day_of_week = v;
            }
            if let Some(v) = retention_days {
                schedule.retention_days = v;
            }
            engine.set_schedule(schedule)?;
            println!("{}", serde_json::to_string_pretty(&engine.schedule())?);
        }
        ScheduleAction::Next => match engine.schedule().next_run_after(Local::now()) {
            Some(next) => println!("Next backup: {}", next.format("%Y-%m-%d %H:%M")),
            None => println!("Scheduled backups are disabled."),
        },
    }
    Ok(())
}

async fn run_history_action(cfg: &Config, action: HistoryAction) -> anyhow::Result<()> {
    let store = EntryHistoryStore::open(cfg).await?;

    match action {
        HistoryAction::Capture {
            source_type,
            source_id,
            file,
            old,
            new,
            write_uids,
            limit,
        } => {
            let source = HistorySource::new(source_type, source_id, file);
            let old_doc = read_document(&old)?;
            let mut new_doc = read_document(&new)?;
            let before = new_doc.clone();

            let stored = store.capture_save(&source, &old_doc, &mut new_doc, limit).await;
            if write_uids && new_doc != before {
                write_document(&new, &new_doc)?;
                println!("Assigned entry uids in {}", new.display());
            }
            println!(
                "Captured {} previous entry version{}.",
                stored,
                if stored == 1 { "" } else { "s" }
            );
        }
        HistoryAction::List {
            source_type,
            source_id,
            file,
            uid,
            limit,
        } => {
            let source = HistorySource::new(source_type, source_id, file);
            let items = store.list(&source, &uid, limit).await;
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
    }

    store.close().await;
    Ok(())
}
