use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn lv_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_lv"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let characters = root.join("data/characters");
    fs::create_dir_all(&characters).unwrap();
    fs::write(characters.join("alice.json"), r#"{"name":"Alice"}"#).unwrap();
    fs::write(characters.join("bob.json"), r#"{"name":"Bob"}"#).unwrap();

    let presets = root.join("data/presets");
    fs::create_dir_all(&presets).unwrap();
    fs::write(presets.join("default.json"), r#"{"temp":0.7}"#).unwrap();

    let config_content = r#"root = ".."

[db]
path = "data/lorevault.sqlite"

[resources]
characters = "data/characters"
presets = "data/presets"

[backup]
path = "data/backups"
retention_days = 30

[history]
limit = 3
"#;

    let config_path = config_dir.join("lorevault.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_lv(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = lv_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lv binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn test_init_creates_database_and_backup_root() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lv(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized"));
    assert!(tmp.path().join("data/lorevault.sqlite").exists());
    assert!(tmp.path().join("data/backups").is_dir());

    let (_, stderr, success) = run_lv(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_backup_run_list_and_delete() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lv(&config_path, &["backup", "run"]);
    assert!(success, "backup run failed: {}", stderr);
    assert!(stdout.contains("3 files"), "unexpected output: {}", stdout);
    assert!(stdout.contains("characters, presets"));

    let (stdout, _, success) = run_lv(&config_path, &["backup", "list"]);
    assert!(success);
    let id = stdout
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().next())
        .unwrap()
        .to_string();
    assert!(tmp.path().join("data/backups").join(&id).is_dir());

    let (_, stderr, success) = run_lv(&config_path, &["backup", "delete", &id]);
    assert!(success, "delete failed: {}", stderr);
    assert!(!tmp.path().join("data/backups").join(&id).exists());

    let (_, _, success) = run_lv(&config_path, &["backup", "delete", &id]);
    assert!(!success);
}

#[test]
fn test_backup_run_single_resource() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lv(
        &config_path,
        &["backup", "run", "--resource", "presets", "--incremental"],
    );
    assert!(success, "backup run failed: {}", stderr);
    assert!(stdout.contains("incremental"));
    assert!(stdout.contains("1 files"));
}

#[test]
fn test_backup_restore_roundtrip() {
    let (tmp, config_path) = setup_test_env();
    run_lv(&config_path, &["backup", "run"]);
    let (stdout, _, _) = run_lv(&config_path, &["backup", "list"]);
    let id = stdout.split_whitespace().next().unwrap().to_string();

    let alice = tmp.path().join("data/characters/alice.json");
    fs::remove_file(&alice).unwrap();

    let (stdout, stderr, success) = run_lv(&config_path, &["backup", "restore", &id]);
    assert!(success, "restore failed: {}", stderr);
    assert!(stdout.contains("Restored characters"));
    assert!(alice.is_file());
}

#[test]
fn test_rejects_bad_changed_argument() {
    let (_tmp, config_path) = setup_test_env();
    let (_, stderr, success) = run_lv(
        &config_path,
        &["backup", "run", "--incremental", "--changed", "spaceships:x"],
    );
    assert!(!success);
    assert!(stderr.contains("spaceships"));
}

#[test]
fn test_schedule_set_persists() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_lv(
        &config_path,
        &[
            "schedule", "set", "--enabled", "true", "--type", "daily", "--hour", "4",
        ],
    );
    assert!(success, "schedule set failed: {}", stderr);
    assert!(stdout.contains("\"daily\""));

    let saved = fs::read_to_string(&config_path).unwrap();
    assert!(saved.contains("schedule = \"daily\""));
    assert!(saved.contains("hour = 4"));

    let (stdout, _, success) = run_lv(&config_path, &["schedule", "next"]);
    assert!(success);
    assert!(stdout.contains("04:00"));

    let (_, _, success) = run_lv(&config_path, &["schedule", "set", "--hour", "25"]);
    assert!(!success);
}

#[test]
fn test_history_capture_and_list() {
    let (tmp, config_path) = setup_test_env();
    let old = tmp.path().join("old.json");
    let new = tmp.path().join("new.json");
    fs::write(
        &old,
        r#"{"entries":[{"st_manager_uid":"wi-a","content":"first draft"}]}"#,
    )
    .unwrap();
    fs::write(
        &new,
        r#"{"entries":[{"st_manager_uid":"wi-a","content":"second draft"}]}"#,
    )
    .unwrap();

    let scope = [
        "--source-type",
        "worldbook",
        "--source-id",
        "lore",
        "--file",
        "data/worlds/lore.json",
    ];
    let mut capture = vec!["history", "capture"];
    capture.extend_from_slice(&scope);
    capture.extend_from_slice(&["--old", old.to_str().unwrap(), "--new", new.to_str().unwrap()]);

    let (stdout, stderr, success) = run_lv(&config_path, &capture);
    assert!(success, "capture failed: {}", stderr);
    assert!(stdout.contains("Captured 1"));

    let mut list = vec!["history", "list"];
    list.extend_from_slice(&scope);
    list.extend_from_slice(&["--uid", "wi-a"]);
    let (stdout, stderr, success) = run_lv(&config_path, &list);
    assert!(success, "list failed: {}", stderr);
    let items: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(items.as_array().unwrap().len(), 1);
    assert_eq!(items[0]["snapshot"]["content"], "first draft");
}

#[test]
fn test_uids_ensure_rewrites_document() {
    let tmp = TempDir::new().unwrap();
    let doc = tmp.path().join("book.json");
    fs::write(&doc, r#"[{"content":"a"},{"content":"b"}]"#).unwrap();

    // Works without a config file.
    let missing = tmp.path().join("missing.toml");
    let (_, stderr, success) = run_lv(&missing, &["uids", "ensure", doc.to_str().unwrap()]);
    assert!(success, "uids ensure failed: {}", stderr);

    let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(&doc).unwrap()).unwrap();
    let uids: Vec<&str> = value
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["st_manager_uid"].as_str().unwrap())
        .collect();
    assert_eq!(uids.len(), 2);
    assert!(uids.iter().all(|u| u.starts_with("wi-")));
    assert_ne!(uids[0], uids[1]);
}

#[test]
fn test_history_capture_writes_assigned_uids() {
    let (tmp, config_path) = setup_test_env();
    let old = tmp.path().join("old.json");
    let new = tmp.path().join("new.json");
    fs::write(&old, r#"[{"content":"first"},{"content":"second"}]"#).unwrap();
    fs::write(&new, r#"[{"content":"first, edited"},{"content":"second"}]"#).unwrap();

    let (stdout, stderr, success) = run_lv(
        &config_path,
        &[
            "history",
            "capture",
            "--source-type",
            "worldbook",
            "--source-id",
            "lore",
            "--file",
            "data/worlds/lore.json",
            "--old",
            old.to_str().unwrap(),
            "--new",
            new.to_str().unwrap(),
            "--write-uids",
        ],
    );
    assert!(success, "capture failed: {}", stderr);
    assert!(stdout.contains("Captured 1"));

    let saved: serde_json::Value = serde_json::from_str(&fs::read_to_string(&new).unwrap()).unwrap();
    let uid = saved[0]["st_manager_uid"].as_str().unwrap().to_string();
    assert!(uid.starts_with("wi-"));

    let (stdout, _, success) = run_lv(
        &config_path,
        &[
            "history",
            "list",
            "--source-type",
            "worldbook",
            "--source-id",
            "lore",
            "--file",
            "data/worlds/lore.json",
            "--uid",
            &uid,
        ],
    );
    assert!(success);
    let items: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(items[0]["snapshot"]["content"], "first");
}
