//! TOML configuration parsing and write-back.
//!
//! Every directory in the configuration may be absolute or relative. Relative
//! paths resolve against [`Config::root`], which itself defaults to the
//! directory holding the configuration file.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::models::ResourceType;
use crate::schedule::{ScheduleConfig, ScheduleKind};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Application root used to resolve relative paths, as written in the file.
    #[serde(default, skip_serializing_if = "path_is_empty")]
    pub root: PathBuf,
    /// `root` resolved against the config file location.
    #[serde(skip)]
    base_dir: PathBuf,
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub resources: ResourcesConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DbConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn path_is_empty(p: &Path) -> bool {
    p.as_os_str().is_empty()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("data/lorevault.sqlite")
}

/// Source directory per resource type. Unset types are skipped by backups.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ResourcesConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub characters: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worldbooks: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presets: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regexes: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scripts: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quickreplies: Option<PathBuf>,
}

impl ResourcesConfig {
    pub fn get(&self, resource: ResourceType) -> Option<&PathBuf> {
        match resource {
            ResourceType::Characters => self.characters.as_ref(),
            ResourceType::Worldbooks => self.worldbooks.as_ref(),
            ResourceType::Presets => self.presets.as_ref(),
            ResourceType::Regexes => self.regexes.as_ref(),
            ResourceType::Scripts => self.scripts.as_ref(),
            ResourceType::Quickreplies => self.quickreplies.as_ref(),
        }
    }

    pub fn set(&mut self, resource: ResourceType, path: impl Into<PathBuf>) {
        let slot = match resource {
            ResourceType::Characters => &mut self.characters,
            ResourceType::Worldbooks => &mut self.worldbooks,
            ResourceType::Presets => &mut self.presets,
            ResourceType::Regexes => &mut self.regexes,
            ResourceType::Scripts => &mut self.scripts,
            ResourceType::Quickreplies => &mut self.quickreplies,
        };
        *slot = Some(path.into());
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BackupConfig {
    #[serde(default = "default_backup_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub schedule: ScheduleKind,
    #[serde(default = "default_hour")]
    pub hour: u32,
    #[serde(default)]
    pub day_of_week: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            path: default_backup_path(),
            enabled: false,
            schedule: ScheduleKind::Disabled,
            hour: default_hour(),
            day_of_week: 0,
            retention_days: default_retention_days(),
        }
    }
}

impl BackupConfig {
    pub fn schedule_config(&self) -> ScheduleConfig {
        ScheduleConfig {
            enabled: self.enabled,
            kind: self.schedule,
            hour: self.hour,
            day_of_week: self.day_of_week,
            retention_days: self.retention_days,
        }
    }

    pub fn apply_schedule(&mut self, schedule: &ScheduleConfig) {
        self.enabled = schedule.enabled;
        self.schedule = schedule.kind;
        self.hour = schedule.hour;
        self.day_of_week = schedule.day_of_week;
        self.retention_days = schedule.retention_days;
    }
}

fn default_backup_path() -> PathBuf {
    PathBuf::from("data/backups")
}
fn default_hour() -> u32 {
    3
}
fn default_retention_days() -> u32 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryConfig {
    #[serde(default = "default_history_limit")]
    pub limit: i64,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            limit: default_history_limit(),
        }
    }
}

fn default_history_limit() -> i64 {
    crate::history::DEFAULT_HISTORY_LIMIT as i64
}

impl Config {
    /// Configuration with every default and `root` as application root.
    pub fn minimal(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            base_dir: root.clone(),
            root,
            db: DbConfig::default(),
            resources: ResourcesConfig::default(),
            backup: BackupConfig::default(),
            history: HistoryConfig::default(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Resolve a configured path against the application root.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Live directory for a resource type, or `None` when not configured.
    pub fn resource_dir(&self, resource: ResourceType) -> Option<PathBuf> {
        self.resources
            .get(resource)
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| self.resolve(p))
    }

    pub fn backup_root(&self) -> PathBuf {
        self.resolve(&self.backup.path)
    }

    pub fn db_path(&self) -> PathBuf {
        self.resolve(&self.db.path)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    let config_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let config_dir = if config_dir.is_absolute() {
        config_dir.to_path_buf()
    } else {
        std::env::current_dir()
            .with_context(|| "Failed to read current directory")?
            .join(config_dir)
    };
    config.base_dir = if config.root.as_os_str().is_empty() {
        config_dir
    } else {
        config_dir.join(&config.root)
    };

    if let Err(e) = config.backup.schedule_config().validate() {
        bail!("backup: {}", e);
    }

    if config.history.limit < 1 {
        bail!("history.limit must be >= 1");
    }

    Ok(config)
}

/// Write the configuration back to `path`.
///
/// `root` is written as it was read, so the file resolves the same way when
/// loaded again from the same location.
pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let content =
        toml::to_string_pretty(config).with_context(|| "Failed to serialize config")?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}
