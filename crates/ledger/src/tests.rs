use super::*;

use tempfile::TempDir;

fn change(component: &str) -> ChangeRecord {
    ChangeRecord {
        component: component.to_string(),
        detail: format!("hardened {}", component),
        rollback_command: format!("defaults delete com.example {}", component),
        timestamp: now_unix_secs(),
    }
}

fn plan(component: &str) -> PlannedAction {
    PlannedAction {
        component: component.to_string(),
        action: "would execute fix".to_string(),
        command: "defaults write com.example key -bool true".to_string(),
        timestamp: now_unix_secs(),
    }
}

#[test]
fn begin_run_creates_both_artifacts() {
    let dir = TempDir::new().expect("tempdir");
    let writer = LedgerWriter::begin_run(dir.path(), "firewall").expect("begin");

    assert!(writer.rollback_path().exists());
    assert!(writer.plan_path().exists());
    let name = writer
        .rollback_path()
        .file_name()
        .and_then(|n| n.to_str())
        .expect("name");
    assert!(name.starts_with("firewall_"));
    assert!(name.ends_with("_rollback.json"));
}

#[test]
fn successive_runs_get_distinct_files() {
    let dir = TempDir::new().expect("tempdir");
    let first = LedgerWriter::begin_run(dir.path(), "firewall").expect("begin");
    let second = LedgerWriter::begin_run(dir.path(), "firewall").expect("begin");

    assert_ne!(first.rollback_path(), second.rollback_path());
    assert_ne!(first.plan_path(), second.plan_path());
    assert!(first.rollback_path().exists());
    assert!(second.rollback_path().exists());
}

#[test]
fn finalized_rollback_artifact_is_well_formed_json() {
    let dir = TempDir::new().expect("tempdir");
    let mut writer = LedgerWriter::begin_run(dir.path(), "privacy").expect("begin");
    writer.append_change(change("telemetry")).expect("append");
    writer.append_change(change("siri")).expect("append");
    writer
        .finalize(RunStatus::AppliedChanges)
        .expect("finalize");

    let raw = fs::read_to_string(writer.rollback_path()).expect("read");
    let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(parsed["script"], "privacy");
    assert_eq!(parsed["status"], "applied_changes");
    assert!(parsed["finished_at"].is_u64());
    assert_eq!(parsed["changes"].as_array().map(|a| a.len()), Some(2));
}

#[test]
fn plan_artifact_carries_planned_actions_only() {
    let dir = TempDir::new().expect("tempdir");
    let mut writer = LedgerWriter::begin_run(dir.path(), "firewall").expect("begin");
    writer.append_plan(plan("stealth_mode")).expect("append");
    writer.finalize(RunStatus::DryRun).expect("finalize");

    let raw = fs::read_to_string(writer.plan_path()).expect("read");
    let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(parsed["status"], "dry_run");
    assert_eq!(parsed["planned"].as_array().map(|a| a.len()), Some(1));
    assert!(parsed.get("changes").is_none());
}

#[test]
fn finalize_twice_is_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let mut writer = LedgerWriter::begin_run(dir.path(), "firewall").expect("begin");
    writer
        .finalize(RunStatus::AlreadyCompliant)
        .expect("finalize");

    assert!(matches!(
        writer.finalize(RunStatus::Failed),
        Err(LedgerError::AlreadyFinalized)
    ));
}

#[test]
fn appends_after_finalize_are_rejected() {
    let dir = TempDir::new().expect("tempdir");
    let mut writer = LedgerWriter::begin_run(dir.path(), "firewall").expect("begin");
    writer.finalize(RunStatus::DryRun).expect("finalize");

    assert!(matches!(
        writer.append_change(change("stealth_mode")),
        Err(LedgerError::AlreadyFinalized)
    ));
    assert!(matches!(
        writer.append_plan(plan("stealth_mode")),
        Err(LedgerError::AlreadyFinalized)
    ));
}

#[test]
fn exit_codes_follow_the_contract() {
    assert_eq!(RunStatus::Failed.exit_code(), 1);
    assert_eq!(RunStatus::DryRun.exit_code(), 0);
    assert_eq!(RunStatus::AlreadyCompliant.exit_code(), 10);
    assert_eq!(RunStatus::AppliedChanges.exit_code(), 0);
}

#[test]
fn irreversible_changes_are_flagged() {
    let mut record = change("telemetry");
    assert!(!record.is_irreversible());
    record.rollback_command = "  ".to_string();
    assert!(record.is_irreversible());
}

#[test]
fn failed_persist_surfaces_io_error_and_keeps_prior_artifact() {
    let dir = TempDir::new().expect("tempdir");
    let state = dir.path().join("state");
    let mut writer = LedgerWriter::begin_run(&state, "firewall").expect("begin");
    writer.append_change(change("stealth_mode")).expect("append");

    // Yank the state dir out from under the writer so the next persist
    // cannot create its temp file.
    let aside = dir.path().join("aside");
    fs::rename(&state, &aside).expect("move state dir");
    let err = writer
        .append_change(change("logging_mode"))
        .expect_err("persist without a state dir");
    assert!(matches!(err, LedgerError::Io(_)));
    fs::rename(&aside, &state).expect("restore state dir");

    // The last successfully persisted artifact is intact.
    let raw = fs::read_to_string(writer.rollback_path()).expect("read");
    let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    assert_eq!(parsed["changes"].as_array().map(|a| a.len()), Some(1));
    assert_eq!(parsed["changes"][0]["component"], "stealth_mode");
}

#[test]
fn cleanup_keeps_most_recent_pairs() {
    let dir = TempDir::new().expect("tempdir");
    let mut paths = Vec::new();
    for i in 0..5 {
        let rollback = dir.path().join(format!("hardening_{:04}_rollback.json", i));
        let plan = dir.path().join(format!("hardening_{:04}_plan.json", i));
        fs::write(&rollback, b"{}").expect("write");
        fs::write(&plan, b"{}").expect("write");
        paths.push((rollback, plan));
    }

    let removed = cleanup_old_runs(dir.path(), 2).expect("cleanup");
    assert_eq!(removed, 3);

    for (rollback, plan) in &paths[..3] {
        assert!(!rollback.exists());
        assert!(!plan.exists());
    }
    for (rollback, plan) in &paths[3..] {
        assert!(rollback.exists());
        assert!(plan.exists());
    }
}

#[test]
fn cleanup_prunes_by_run_age_across_scripts() {
    let dir = TempDir::new().expect("tempdir");
    // Interleaved runs of two scripts; lexicographic filename order would
    // group them by script instead of age.
    let names = [
        "backup_100_rollback.json",
        "hardening_200_rollback.json",
        "backup_300_rollback.json",
        "hardening_400_rollback.json",
    ];
    for name in names {
        fs::write(dir.path().join(name), b"{}").expect("write");
        fs::write(
            dir.path().join(name.replace("_rollback.json", "_plan.json")),
            b"{}",
        )
        .expect("write");
    }

    let removed = cleanup_old_runs(dir.path(), 2).expect("cleanup");
    assert_eq!(removed, 2);

    assert!(!dir.path().join("backup_100_rollback.json").exists());
    assert!(!dir.path().join("hardening_200_rollback.json").exists());
    assert!(dir.path().join("backup_300_rollback.json").exists());
    assert!(dir.path().join("backup_300_plan.json").exists());
    assert!(dir.path().join("hardening_400_rollback.json").exists());
}

#[test]
fn cleanup_is_a_noop_below_the_threshold() {
    let dir = TempDir::new().expect("tempdir");
    let rollback = dir.path().join("hardening_0001_rollback.json");
    fs::write(&rollback, b"{}").expect("write");

    let removed = cleanup_old_runs(dir.path(), 5).expect("cleanup");
    assert_eq!(removed, 0);
    assert!(rollback.exists());
}
