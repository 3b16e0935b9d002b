//! Canonical entry snapshots and their content hashes.
//!
//! A snapshot is a deep copy of an entry with the fields the editor rewrites
//! on its own (`id`, `uid`, `displayIndex`) removed, so two snapshots only
//! differ when the user changed something. The hash is SHA-256 over a
//! canonical JSON encoding: object keys sorted at every depth, no
//! whitespace.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::document::{entry_uid, Entry, ENTRY_UID_FIELD};

/// Fields that track position or editor state rather than content.
const TRANSIENT_FIELDS: [&str; 3] = ["id", "uid", "displayIndex"];

/// Canonical copy of `entry`.
///
/// When `forced_uid` is non-empty it replaces the entry's own uid, which
/// keeps an old and a new version of the same entry comparable even if the
/// stored uid field drifted.
pub fn snapshot(entry: &Entry, forced_uid: Option<&str>) -> Map<String, Value> {
    let mut snap = entry.clone();
    for field in TRANSIENT_FIELDS {
        snap.remove(field);
    }

    let uid = forced_uid
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .or_else(|| entry_uid(&snap));
    match uid {
        Some(uid) => {
            snap.insert(ENTRY_UID_FIELD.to_string(), Value::String(uid));
        }
        None => {
            snap.remove(ENTRY_UID_FIELD);
        }
    }
    snap
}

/// Hex SHA-256 of the canonical encoding of `snapshot`.
pub fn snapshot_hash(snapshot: &Map<String, Value>) -> String {
    let mut canonical = String::new();
    write_canonical_object(snapshot, &mut canonical);
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Compact JSON used for storage. Not canonical; hashing uses
/// [`snapshot_hash`].
pub fn to_json(snapshot: &Map<String, Value>) -> String {
    Value::Object(snapshot.clone()).to_string()
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_canonical_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_canonical_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.into_iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String(key.clone()).to_string());
        out.push(':');
        write_canonical(&map[key.as_str()], out);
    }
    out.push('}');
}
