//! In-memory change hints for incremental backups.
//!
//! Callers report every resource they write. Incremental backups copy a
//! file whose name was reported even if its mtime looks old, which covers
//! tools that preserve timestamps when writing.
//!
//! The hints live only as long as the process. After a restart, incremental
//! backups rely on file modification times alone until new changes are
//! reported. Hints are never cleared by a backup, so a reported file is
//! copied by every later incremental backup in the same process.

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

use crate::models::ResourceType;

#[derive(Debug, Default)]
pub struct ChangeTracker {
    changes: RwLock<HashMap<ResourceType, HashMap<String, i64>>>,
}

impl ChangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note that `resource_id` changed at `timestamp_ms` (default: now).
    pub fn record_change(
        &self,
        resource_type: ResourceType,
        resource_id: &str,
        timestamp_ms: Option<i64>,
    ) {
        let ts = timestamp_ms.unwrap_or_else(|| chrono::Utc::now().timestamp_millis());
        self.changes
            .write()
            .entry(resource_type)
            .or_default()
            .insert(resource_id.to_string(), ts);
    }

    /// Ids reported for `resource_type`.
    pub fn changed_ids(&self, resource_type: ResourceType) -> HashSet<String> {
        self.changes
            .read()
            .get(&resource_type)
            .map(|ids| ids.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Last reported change time for one resource, in milliseconds.
    pub fn last_change(&self, resource_type: ResourceType, resource_id: &str) -> Option<i64> {
        self.changes
            .read()
            .get(&resource_type)
            .and_then(|ids| ids.get(resource_id).copied())
    }

    pub fn is_empty(&self) -> bool {
        self.changes.read().values().all(HashMap::is_empty)
    }
}
