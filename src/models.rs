//! Core data models used throughout lorevault.
//!
//! These types represent the resource categories that get backed up, the
//! backup records written next to each archive, and the per-entry history
//! records kept for structured documents.

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Category of user asset. Each maps to exactly one configured directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Characters,
    Worldbooks,
    Presets,
    Regexes,
    Scripts,
    Quickreplies,
}

impl ResourceType {
    pub const ALL: [ResourceType; 6] = [
        ResourceType::Characters,
        ResourceType::Worldbooks,
        ResourceType::Presets,
        ResourceType::Regexes,
        ResourceType::Scripts,
        ResourceType::Quickreplies,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Characters => "characters",
            ResourceType::Worldbooks => "worldbooks",
            ResourceType::Presets => "presets",
            ResourceType::Regexes => "regexes",
            ResourceType::Scripts => "scripts",
            ResourceType::Quickreplies => "quickreplies",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ResourceType::ALL
            .into_iter()
            .find(|rt| rt.as_str() == wanted)
            .ok_or_else(|| {
                format!(
                    "unknown resource type '{}'. Must be one of: {}",
                    s,
                    ResourceType::ALL
                        .iter()
                        .map(|rt| rt.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

/// Record describing one backup archive.
///
/// Serialized as the archive's `metadata.json`. The field names match the
/// metadata layout older archives were written with, so those stay readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupRecord {
    pub id: String,
    #[serde(rename = "timestamp", with = "flexible_timestamp")]
    pub created_at: DateTime<Local>,
    #[serde(default)]
    pub resources: Vec<ResourceType>,
    #[serde(default)]
    pub file_count: u64,
    #[serde(default)]
    pub size_bytes: u64,
    #[serde(default)]
    pub size_mb: f64,
    #[serde(default)]
    pub incremental: bool,
    #[serde(rename = "path", default)]
    pub storage_path: PathBuf,
}

impl BackupRecord {
    /// True when this record was synthesized for an archive without metadata.
    pub fn is_legacy(&self) -> bool {
        self.resources.is_empty() && self.file_count == 0 && self.size_bytes == 0
    }
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// RFC 3339 on write; on read also accepts the naive ISO-8601 form
/// (`2024-05-01T03:00:00.123456`) that older metadata carries.
mod flexible_timestamp {
    use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Local>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&ts.to_rfc3339())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Local>, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| de::Error::custom(format!("invalid backup timestamp: {}", raw)))
    }

    pub(super) fn parse_naive(raw: &str) -> Option<DateTime<Local>> {
        let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
        Local.from_local_datetime(&naive).earliest()
    }
}

/// Parse a metadata timestamp in either RFC 3339 or naive ISO-8601 form.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Local>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Local));
    }
    flexible_timestamp::parse_naive(raw)
}

/// One superseded entry version, as produced by
/// [`collect_previous_versions`](crate::history::collect_previous_versions).
#[derive(Debug, Clone, PartialEq)]
pub struct PreviousVersion {
    pub entry_uid: String,
    pub snapshot: Map<String, Value>,
}

/// Identifies the document an entry history belongs to.
#[derive(Debug, Clone, Default)]
pub struct HistorySource {
    pub source_type: String,
    pub source_id: String,
    pub file_path: String,
}

impl HistorySource {
    pub fn new(
        source_type: impl Into<String>,
        source_id: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self {
            source_type: source_type.into(),
            source_id: source_id.into(),
            file_path: file_path.into(),
        }
    }
}

/// A stored history row as returned by [`EntryHistoryStore::list`](crate::history::EntryHistoryStore::list).
#[derive(Debug, Clone, Serialize)]
pub struct HistoryItem {
    pub id: i64,
    /// Seconds since the Unix epoch, fractional.
    pub created_at: f64,
    pub snapshot: Value,
}
