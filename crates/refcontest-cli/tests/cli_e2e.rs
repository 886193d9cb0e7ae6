//! Subprocess tests for the `refcontest` binary.
//!
//! Each test seeds a database in a temporary directory through the core
//! library, runs the binary against it, and checks the JSON output.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use refcontest_core::SqliteStore;
use serde_json::Value;

fn refcontest_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_refcontest"))
}

fn run(db: &Path, args: &[&str]) -> Output {
    Command::new(refcontest_bin())
        .arg("--config")
        .arg(db.with_extension("toml"))
        .arg("--db")
        .arg(db)
        .arg("--json")
        .args(args)
        .env_remove("REFCONTEST_ADMIN_IDS")
        .output()
        .expect("run refcontest")
}

fn json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "command failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).expect("valid JSON output")
}

fn seeded(dir: &Path) -> PathBuf {
    let db = dir.join("contest.db");
    let store = SqliteStore::open(&db).unwrap();
    store.register_or_touch(1, "alice", "Alice", None).unwrap();
    for invitee in [2, 3] {
        store.register_or_touch(invitee, "", "", Some(1)).unwrap();
        store.record_referral(invitee, 1).unwrap();
    }
    store.set_verified(2, true).unwrap();
    store.credit_if_eligible(2).unwrap();
    db
}

#[test]
fn stats_and_top_reflect_credited_referrals() {
    let dir = tempfile::tempdir().unwrap();
    let db = seeded(dir.path());

    let stats = json(&run(&db, &["stats"]));
    assert_eq!(stats["users_total"], 3);
    assert_eq!(stats["referrals_credited"], 1);
    assert_eq!(stats["contest_state"], "ACTIVE");

    let top = json(&run(&db, &["top", "-n", "1"]));
    let rows = top.as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["user_id"], 1);
    assert_eq!(rows[0]["score"], 1);
}

#[test]
fn user_report_includes_rank_and_tier() {
    let dir = tempfile::tempdir().unwrap();
    let db = seeded(dir.path());

    let report = json(&run(&db, &["user", "1"]));
    assert_eq!(report["stats"]["total_invited"], 2);
    assert_eq!(report["stats"]["score"], 1);
    assert_eq!(report["standing"]["rank"], 1);
    assert_eq!(report["tier"]["tier"], "leader");

    let missing = run(&db, &["user", "999"]);
    assert!(!missing.status.success());
}

#[test]
fn finish_requires_confirmation_then_purges() {
    let dir = tempfile::tempdir().unwrap();
    let db = seeded(dir.path());
    json(&run(&db, &["prize", "add", "1", "Phone"]));

    let refused = run(&db, &["contest", "finish"]);
    assert!(!refused.status.success());

    json(&run(&db, &["contest", "finish", "--yes"]));
    assert_eq!(json(&run(&db, &["contest", "status"])), "STOPPED");
    assert_eq!(json(&run(&db, &["top"])), Value::Array(Vec::new()));
    assert_eq!(json(&run(&db, &["prize", "list"])).as_array().unwrap().len(), 1);
}

#[test]
fn channels_and_admins_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let db = seeded(dir.path());

    assert_eq!(json(&run(&db, &["channel", "add", "@news"]))["changed"], true);
    assert_eq!(json(&run(&db, &["channel", "add", "@news"]))["changed"], false);
    assert_eq!(json(&run(&db, &["channel", "list"])), serde_json::json!(["@news"]));

    json(&run(&db, &["admin", "add", "77"]));
    let admins = json(&run(&db, &["admin", "list"]));
    assert_eq!(admins, serde_json::json!([{ "user_id": 77, "configured": false }]));
}

#[test]
fn configured_admins_cannot_be_removed() {
    let dir = tempfile::tempdir().unwrap();
    let db = seeded(dir.path());
    std::fs::write(db.with_extension("toml"), "[admins]\nids = [5]\n").unwrap();

    let output = run(&db, &["admin", "remove", "5"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("configuration"));
}
