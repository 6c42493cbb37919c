use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn lsc_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("lsc");
    path
}

struct TestEnv {
    _tmp: TempDir,
    config_path: PathBuf,
    records_path: PathBuf,
    ontology_path: PathBuf,
}

fn setup_test_env() -> TestEnv {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::create_dir_all(root.join("data")).unwrap();

    let records_path = root.join("records.ndjson");
    fs::write(
        &records_path,
        concat!(
            r#"{"category":"procurement","doc_id":"AW-1","snippet":"Award for metamaterial cloaking research","occurred_at":"2026-08-01T00:00:00Z","place_text":"Albuquerque, NM"}"#,
            "\n",
            r#"{"category":"procurement","doc_id":"AW-2","snippet":"Routine janitorial services","occurred_at":"2026-08-02T00:00:00Z"}"#,
            "\n",
        ),
    )
    .unwrap();

    let ontology_path = root.join("ontology.json");
    fs::write(
        &ontology_path,
        r#"{
            "version": "2025.1",
            "packs": [{
                "id": "materials",
                "name": "Exotic materials",
                "rules": [
                    {"id": "metamaterial", "kind": "phrase", "pattern": "metamaterial", "weight": 5, "fields": ["snippet"]}
                ]
            }]
        }"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/leads.sqlite"

[index]
path = "{root}/data/index.sqlite"

[tagging]
window_days = 36500
batch = 100

[scoring]
version = "v1"
min_score = 1.0
limit = 200

[server]
bind = "127.0.0.1:7431"

[connectors.file]
path = "{root}/records.ndjson"
source = "registry"
"#,
        root = root.display()
    );

    let config_path = root.join("config").join("leadscope.toml");
    fs::write(&config_path, config_content).unwrap();

    TestEnv {
        _tmp: tmp,
        config_path,
        records_path,
        ontology_path,
    }
}

fn run_lsc(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = lsc_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run lsc binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

/// Parse the trailing machine-readable summary line.
fn last_json(stdout: &str) -> serde_json::Value {
    let line = stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .last()
        .expect("no output lines");
    serde_json::from_str(line).unwrap_or_else(|e| panic!("bad summary line '{}': {}", line, e))
}

fn ingest(env: &TestEnv) -> serde_json::Value {
    let (stdout, stderr, success) = run_lsc(&env.config_path, &["ingest", "file", "--days", "36500"]);
    assert!(success, "ingest failed: stdout={}, stderr={}", stdout, stderr);
    last_json(&stdout)
}

fn apply_ontology(env: &TestEnv) -> serde_json::Value {
    let ontology = env.ontology_path.to_str().unwrap();
    let (stdout, stderr, success) = run_lsc(&env.config_path, &["ontology", "apply", ontology]);
    assert!(success, "apply failed: stdout={}, stderr={}", stdout, stderr);
    last_json(&stdout)
}

#[test]
fn test_init_is_idempotent() {
    let env = setup_test_env();

    let (stdout, stderr, success) = run_lsc(&env.config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert_eq!(last_json(&stdout)["status"], "ok");

    let (_, _, success) = run_lsc(&env.config_path, &["init"]);
    assert!(success, "second init failed (not idempotent)");
}

#[test]
fn test_ingest_twice_inserts_nothing_new() {
    let env = setup_test_env();
    run_lsc(&env.config_path, &["init"]);

    let first = ingest(&env);
    assert_eq!(first["fetched"], 2);
    assert_eq!(first["inserted"], 2);
    assert_eq!(first["duplicates"], 0);
    assert_eq!(first["status"], "success");

    let second = ingest(&env);
    assert_eq!(second["inserted"], 0);
    assert_eq!(second["duplicates"], 2);
    assert_eq!(second["status"], "success");
}

#[test]
fn test_unfingerprintable_record_is_skipped_not_fatal() {
    let env = setup_test_env();
    run_lsc(&env.config_path, &["init"]);

    let mut content = fs::read_to_string(&env.records_path).unwrap();
    content.push_str("{\"category\":\"procurement\",\"snippet\":\"no doc id here\"}\n");
    fs::write(&env.records_path, content).unwrap();

    let outcome = ingest(&env);
    assert_eq!(outcome["fetched"], 3);
    assert_eq!(outcome["inserted"], 2);
    assert_eq!(outcome["skipped"], 1);
    assert_eq!(outcome["status"], "partial");
}

#[test]
fn test_ontology_validate_reports_problems() {
    let env = setup_test_env();

    let ontology = env.ontology_path.to_str().unwrap();
    let (stdout, _, success) = run_lsc(&env.config_path, &["ontology", "validate", ontology]);
    assert!(success);
    let summary = last_json(&stdout);
    assert_eq!(summary["ontology"]["total_rules"], 1);
    assert_eq!(summary["ontology"]["hash"].as_str().unwrap().len(), 64);

    let bad_path = env.ontology_path.with_file_name("bad.json");
    fs::write(
        &bad_path,
        r#"{"version": "1", "packs": [{"id": "p", "name": "P", "rules": [
            {"id": "dup", "kind": "phrase", "pattern": "x", "weight": 1},
            {"id": "dup", "kind": "regex", "pattern": "(unclosed", "weight": 2}
        ]}]}"#,
    )
    .unwrap();
    let (_, stderr, success) =
        run_lsc(&env.config_path, &["ontology", "validate", bad_path.to_str().unwrap()]);
    assert!(!success, "invalid ontology was accepted");
    assert!(stderr.contains("duplicate rule id"), "stderr: {}", stderr);
    assert!(stderr.contains("regex"), "stderr: {}", stderr);
}

#[test]
fn test_tagging_is_idempotent() {
    let env = setup_test_env();
    run_lsc(&env.config_path, &["init"]);
    ingest(&env);

    let first = apply_ontology(&env);
    assert_eq!(first["status"], "success");
    assert_eq!(first["scanned"], 2);
    assert_eq!(first["updated"], 1); // only the metamaterial record gains hits
    assert_eq!(first["unchanged"], 1);

    let second = apply_ontology(&env);
    assert_eq!(second["scanned"], 2);
    assert_eq!(second["updated"], 0);
    assert_eq!(second["unchanged"], 2);
}

#[test]
fn test_leads_rank_by_score_with_floor() {
    let env = setup_test_env();
    run_lsc(&env.config_path, &["init"]);
    ingest(&env);
    apply_ontology(&env);

    let (stdout, stderr, success) = run_lsc(&env.config_path, &["leads", "--min-score", "1"]);
    assert!(success, "leads failed: {}", stderr);
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    // one lead line + one summary line
    assert_eq!(lines.len(), 2, "stdout: {}", stdout);
    let lead: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(lead["record"]["doc_id"], "AW-1");
    assert_eq!(lead["score"], 5.0);
    assert_eq!(lead["breakdown"]["top_clauses"][0]["rule"], "metamaterial");
}

#[test]
fn test_snapshot_delta_reports_one_new_entry() {
    let env = setup_test_env();
    run_lsc(&env.config_path, &["init"]);
    ingest(&env);
    apply_ontology(&env);

    let (stdout, stderr, success) =
        run_lsc(&env.config_path, &["snapshot", "create", "--min-score", "1"]);
    assert!(success, "snapshot A failed: {}", stderr);
    let snap_a = last_json(&stdout);
    assert_eq!(snap_a["items"], 1);

    // A third matching record arrives; retag and re-snapshot.
    let mut content = fs::read_to_string(&env.records_path).unwrap();
    content.push_str("{\"category\":\"procurement\",\"doc_id\":\"AW-3\",\"snippet\":\"metamaterial antenna array\",\"occurred_at\":\"2026-08-05T00:00:00Z\"}\n");
    fs::write(&env.records_path, content).unwrap();
    assert_eq!(ingest(&env)["inserted"], 1);
    apply_ontology(&env);

    let (stdout, _, success) =
        run_lsc(&env.config_path, &["snapshot", "create", "--min-score", "1"]);
    assert!(success);
    let snap_b = last_json(&stdout);
    assert_eq!(snap_b["items"], 2);

    let from = snap_a["snapshot_id"].to_string();
    let to = snap_b["snapshot_id"].to_string();
    let (stdout, stderr, success) = run_lsc(&env.config_path, &["delta", &from, &to]);
    assert!(success, "delta failed: {}", stderr);
    let delta = last_json(&stdout);
    assert_eq!(delta["counts"]["new"], 1);
    assert_eq!(delta["counts"]["removed"], 0);
    assert_eq!(delta["counts"]["changed"], 0);
    assert_eq!(delta["counts"]["unchanged"], 1);
    assert_eq!(delta["new"][0]["score"], 5.0);
}

#[test]
fn test_snapshots_are_immutable_under_retagging() {
    let env = setup_test_env();
    run_lsc(&env.config_path, &["init"]);
    ingest(&env);
    apply_ontology(&env);

    let (stdout, _, _) = run_lsc(&env.config_path, &["snapshot", "create", "--min-score", "1"]);
    let snap = last_json(&stdout);
    let id = snap["snapshot_id"].to_string();

    let (before, _, _) = run_lsc(&env.config_path, &["snapshot", "show", &id]);

    // Retag with a heavier rule set; the frozen snapshot must not move.
    fs::write(
        &env.ontology_path,
        r#"{
            "version": "2025.2",
            "packs": [{
                "id": "materials",
                "name": "Exotic materials",
                "rules": [
                    {"id": "metamaterial", "kind": "phrase", "pattern": "metamaterial", "weight": 50, "fields": ["snippet"]}
                ]
            }]
        }"#,
    )
    .unwrap();
    apply_ontology(&env);

    let (after, _, _) = run_lsc(&env.config_path, &["snapshot", "show", &id]);
    assert_eq!(before, after);
}

#[test]
fn test_reindex_and_search() {
    let env = setup_test_env();
    run_lsc(&env.config_path, &["init"]);
    ingest(&env);
    apply_ontology(&env);

    let (stdout, stderr, success) = run_lsc(&env.config_path, &["reindex"]);
    assert!(success, "reindex failed: {}", stderr);
    let outcome = last_json(&stdout);
    assert_eq!(outcome["mode"], "incremental");
    assert_eq!(outcome["indexed"], 2);
    assert_eq!(outcome["cursor"], 2);

    // No new records: incremental sync is a no-op.
    let (stdout, _, _) = run_lsc(&env.config_path, &["reindex"]);
    assert_eq!(last_json(&stdout)["indexed"], 0);

    let (stdout, stderr, success) = run_lsc(&env.config_path, &["search", "metamaterial"]);
    assert!(success, "search failed: {}", stderr);
    let lines: Vec<&str> = stdout.lines().filter(|l| !l.trim().is_empty()).collect();
    assert_eq!(lines.len(), 2, "stdout: {}", stdout);
    let hit: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(hit["doc_id"], "AW-1");
}

#[test]
fn test_incremental_reindex_refuses_after_reset() {
    let env = setup_test_env();
    run_lsc(&env.config_path, &["init"]);
    ingest(&env);

    let (_, _, success) = run_lsc(&env.config_path, &["reindex"]);
    assert!(success);

    // Destructive reset restarts record ids while the index still carries
    // the old cursor.
    let (_, _, success) = run_lsc(&env.config_path, &["reset", "--destructive"]);
    assert!(success);

    let mut content = String::new();
    content.push_str("{\"category\":\"procurement\",\"doc_id\":\"AW-9\",\"snippet\":\"fresh after reset\"}\n");
    fs::write(&env.records_path, content).unwrap();
    ingest(&env);

    let (_, stderr, success) = run_lsc(&env.config_path, &["reindex"]);
    assert!(!success, "incremental sync after reset must be refused");
    assert!(stderr.contains("reindex --full"), "stderr: {}", stderr);

    let (stdout, stderr, success) = run_lsc(&env.config_path, &["reindex", "--full"]);
    assert!(success, "full rebuild failed: {}", stderr);
    let outcome = last_json(&stdout);
    assert_eq!(outcome["mode"], "full");
    assert_eq!(outcome["indexed"], 1);
}

#[test]
fn test_run_ledger_records_every_execution() {
    let env = setup_test_env();
    run_lsc(&env.config_path, &["init"]);
    ingest(&env);
    ingest(&env);
    apply_ontology(&env);

    let (stdout, _, success) = run_lsc(&env.config_path, &["runs", "--kind", "ingest"]);
    assert!(success);
    let runs: Vec<serde_json::Value> = stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r["status"] == "success"));
    // newest first: the second ingest saw only duplicates
    assert_eq!(runs[0]["inserted"], 0);
    assert_eq!(runs[1]["inserted"], 2);

    let (stdout, _, success) = run_lsc(&env.config_path, &["runs", "--kind", "analysis"]);
    assert!(success);
    let runs: Vec<serde_json::Value> = stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0]["ontology_version"], "2025.1");
    assert_eq!(runs[0]["status"], "success");
}

#[test]
fn test_reset_requires_confirmation() {
    let env = setup_test_env();
    run_lsc(&env.config_path, &["init"]);

    let (_, stderr, success) = run_lsc(&env.config_path, &["reset"]);
    assert!(!success);
    assert!(stderr.contains("--destructive"), "stderr: {}", stderr);
}
