//! # LoreVault
//!
//! Recoverability for personal creative-writing assets: character cards,
//! worldbooks, presets, regex sets, scripts and quick replies.
//!
//! Two independent layers protect the data:
//!
//! - **Directory backups** copy whole resource folders into timestamped
//!   archives, either in full or incrementally, prune them by age and can
//!   restore them with a rollback copy of the live data.
//! - **Entry history** keeps the last few versions of each entry of a
//!   structured document (e.g. a worldbook) in SQLite, keyed by a stable
//!   per-entry uid so edits survive reordering.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌─────────────────────┐
//! │ Resource dirs│──▶│ BackupEngine │──▶│ <root>/<timestamp>/ │
//! └──────────────┘   └──────┬───────┘   └─────────────────────┘
//!                           │ hints
//!                    ┌──────┴───────┐
//!                    │ChangeTracker │
//!                    └──────────────┘
//!
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ old / new doc│──▶│  collect +   │──▶│    SQLite    │
//! │              │   │  snapshot    │   │entry_history │
//! └──────────────┘   └──────────────┘   └──────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`backup`] | Full and incremental backups, restore, retention |
//! | [`tracker`] | In-memory change hints for incremental backups |
//! | [`schedule`] | Backup schedule settings and next-run computation |
//! | [`document`] | Document shapes and entry uids |
//! | [`snapshot`] | Canonical entry snapshots and hashes |
//! | [`scope`] | History scope keys |
//! | [`history`] | Entry history store |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod backup;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod history;
pub mod migrate;
pub mod models;
pub mod schedule;
pub mod scope;
pub mod snapshot;
pub mod tracker;
