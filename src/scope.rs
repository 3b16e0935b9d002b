//! Scope keys: the stable identity of the document an entry history
//! belongs to.
//!
//! The key is a SHA-256 digest of the normalized source type and either the
//! normalized file path or, when no path is known, the source id. A
//! non-empty path always wins over the id, so renaming a file starts a new
//! history unless the caller deliberately keeps the old path.

use sha2::{Digest, Sha256};
use std::path::{Component, Path, PathBuf};

/// Build the scope key for `(source_type, source_id, file_path)`.
///
/// Relative paths resolve against `root`, and a relative `root` against the
/// working directory. The file itself is never touched, so the result does
/// not depend on whether it exists.
pub fn build_scope_key(source_type: &str, source_id: &str, file_path: &str, root: &Path) -> String {
    let stype = normalize_source_type(source_type);
    let npath = normalize_path(file_path, root);
    let raw = if npath.is_empty() {
        let sid = source_id.trim().replace('\\', "/");
        format!("{}|{}|", stype, sid)
    } else {
        format!("{}|{}", stype, npath)
    };
    hex::encode(Sha256::digest(raw.as_bytes()))
}

fn normalize_source_type(source_type: &str) -> String {
    let stype = source_type.trim().to_lowercase();
    if stype.is_empty() {
        "unknown".to_string()
    } else {
        stype
    }
}

/// Absolute, lexically normalized, forward-slash form of `file_path`.
/// Empty input stays empty.
pub fn normalize_path(file_path: &str, root: &Path) -> String {
    let file_path = file_path.trim();
    if file_path.is_empty() {
        return String::new();
    }
    let unified = file_path.replace('\\', "/");
    let path = Path::new(&unified);
    let mut joined = if path.is_absolute() || looks_like_drive_path(&unified) {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    // A relative root would make the key depend on how the path was spelled.
    if !joined.is_absolute() && !looks_like_drive_path(&joined.to_string_lossy()) {
        if let Ok(cwd) = std::env::current_dir() {
            joined = cwd.join(joined);
        }
    }
    lexical_normalize(&joined)
        .to_string_lossy()
        .replace('\\', "/")
}

fn looks_like_drive_path(p: &str) -> bool {
    let bytes = p.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn root() -> PathBuf {
        PathBuf::from("/srv/app")
    }

    #[test]
    fn test_deterministic_and_hex() {
        let a = build_scope_key("worldbook", "book", "worlds/a.json", &root());
        let b = build_scope_key("worldbook", "book", "worlds/a.json", &root());
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_path_wins_over_id() {
        let a = build_scope_key("worldbook", "one", "worlds/a.json", &root());
        let b = build_scope_key("worldbook", "two", "worlds/a.json", &root());
        assert_eq!(a, b);
    }

    #[test]
    fn test_relative_and_absolute_forms_match() {
        let rel = build_scope_key("worldbook", "", "worlds/./sub/../a.json", &root());
        let abs = build_scope_key("worldbook", "", "/srv/app/worlds/a.json", &root());
        let win = build_scope_key("worldbook", "", "worlds\\a.json", &root());
        assert_eq!(rel, abs);
        assert_eq!(rel, win);
    }

    #[test]
    fn test_source_type_normalized() {
        let a = build_scope_key("  WorldBook ", "x", "", &root());
        let b = build_scope_key("worldbook", "x", "", &root());
        assert_eq!(a, b);
        let unknown = build_scope_key("", "x", "", &root());
        let explicit = build_scope_key("unknown", "x", "", &root());
        assert_eq!(unknown, explicit);
    }

    #[test]
    fn test_type_and_id_separate_scopes() {
        let a = build_scope_key("worldbook", "x", "", &root());
        let b = build_scope_key("character", "x", "", &root());
        let c = build_scope_key("worldbook", "y", "", &root());
        assert_ne!(a, b);
        assert_ne!(a, c);
        let by_path = build_scope_key("worldbook", "x", "x", &root());
        assert_ne!(a, by_path);
    }

    #[test]
    fn test_relative_root_resolves_against_working_directory() {
        let cwd = std::env::current_dir().unwrap();
        let rel_root = PathBuf::from("cfg");
        let from_relative = build_scope_key("worldbook", "", "worlds/a.json", &rel_root);
        let absolute = cwd.join("cfg/worlds/a.json");
        let from_absolute =
            build_scope_key("worldbook", "", &absolute.to_string_lossy(), &rel_root);
        assert_eq!(from_relative, from_absolute);
        assert!(Path::new(&normalize_path("worlds/a.json", &rel_root)).is_absolute());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("", &root()), "");
        assert_eq!(normalize_path("a/../b.json", &root()), "/srv/app/b.json");
    }
}
