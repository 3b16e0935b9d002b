//! Structured documents and per-entry identity.
//!
//! A world-info style document arrives in one of three JSON shapes: a bare
//! array of entries, an object with an `entries` array, or an object with an
//! `entries` map keyed by display slot. Everything downstream works on the
//! ordered entry sequence produced here and never looks at the shape again.

use serde_json::{Map, Value};
use std::collections::HashSet;
use uuid::Uuid;

/// Field that carries an entry's stable identity.
pub const ENTRY_UID_FIELD: &str = "st_manager_uid";

pub type Entry = Map<String, Value>;

/// Entries of `document` in document order. Non-object items are skipped.
pub fn entries(document: &Value) -> Vec<&Entry> {
    let items: Vec<&Value> = match document {
        Value::Array(list) => list.iter().collect(),
        Value::Object(obj) => match obj.get("entries") {
            Some(Value::Array(list)) => list.iter().collect(),
            Some(Value::Object(map)) => map.values().collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items.into_iter().filter_map(Value::as_object).collect()
}

/// Mutable view of the same entries [`entries`] returns.
pub fn entries_mut(document: &mut Value) -> Vec<&mut Entry> {
    let items: Vec<&mut Value> = match document {
        Value::Array(list) => list.iter_mut().collect(),
        Value::Object(obj) => match obj.get_mut("entries") {
            Some(Value::Array(list)) => list.iter_mut().collect(),
            Some(Value::Object(map)) => map.values_mut().collect(),
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    items.into_iter().filter_map(Value::as_object_mut).collect()
}

/// The entry's uid, trimmed. Non-zero numbers count as their decimal form;
/// zero, like anything else, reads as no uid.
pub fn entry_uid(entry: &Entry) -> Option<String> {
    let raw = match entry.get(ENTRY_UID_FIELD)? {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) if n.as_f64() != Some(0.0) => n.to_string(),
        _ => return None,
    };
    (!raw.is_empty()).then_some(raw)
}

pub fn new_entry_uid() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("wi-{}", &hex[..16])
}

/// Give every entry a uid that is unique within the document.
///
/// Entries without a uid, or repeating one already seen earlier in the
/// document, get a fresh one. Stored uids that only needed trimming are
/// rewritten. Returns whether anything changed.
pub fn ensure_entry_uids(document: &mut Value) -> bool {
    let mut changed = false;
    let mut used: HashSet<String> = HashSet::new();

    for entry in entries_mut(document) {
        let uid = match entry_uid(entry) {
            Some(uid) if !used.contains(&uid) => uid,
            _ => {
                let mut fresh = new_entry_uid();
                while used.contains(&fresh) {
                    fresh = new_entry_uid();
                }
                fresh
            }
        };
        if entry.get(ENTRY_UID_FIELD).and_then(Value::as_str) != Some(uid.as_str()) {
            entry.insert(ENTRY_UID_FIELD.to_string(), Value::String(uid.clone()));
            changed = true;
        }
        used.insert(uid);
    }

    changed
}
