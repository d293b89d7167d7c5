use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use jsonschema::JSONSchema;
use serde_json::Value;

const FIXED_SUBMITTED_AT: &str = "2023-11-14T22:13:20Z";

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}-{}", std::process::id()));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_mm<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_mm"))
        .args(args)
        .env_remove("MAJOR_MATCH_LOG")
        .output()
        .unwrap_or_else(|err| panic!("failed to execute mm binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_mm(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "mm command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

fn repo_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("../..")
        .canonicalize()
        .unwrap_or_else(|err| panic!("failed to canonicalize repo root: {err}"))
}

fn read_json_file(path: &Path) -> Value {
    let body = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read JSON file {}: {err}", path.display()));
    serde_json::from_str(&body)
        .unwrap_or_else(|err| panic!("failed to parse JSON file {}: {err}", path.display()))
}

fn validate_schema(schema_file: &str, instance: &Value) {
    let schema_path = repo_root().join("contracts/v1/schemas").join(schema_file);
    let schema_json = read_json_file(&schema_path);
    let compiled = JSONSchema::compile(&schema_json)
        .unwrap_or_else(|err| panic!("failed to compile schema {}: {err}", schema_path.display()));

    let errors = compiled
        .validate(instance)
        .err()
        .map(|iter| iter.map(|err| err.to_string()).collect::<Vec<_>>());
    if let Some(errors) = errors {
        panic!("schema validation failed for {}:\n{}", schema_file, errors.join("\n"));
    }
}

fn answers_csv(value: u8) -> String {
    vec![value.to_string(); 20].join(",")
}

fn submit(db: &Path, answers: &str) -> Value {
    run_json([
        "--db",
        path_str(db),
        "quiz",
        "submit",
        "--answers",
        answers,
        "--submitted-at",
        FIXED_SUBMITTED_AT,
    ])
}

// Test IDs: TCLI-001
#[test]
fn db_commands_cover_schema_migrate_and_integrity() {
    let sandbox = unique_temp_dir("majormatch-cli-db");
    let db = sandbox.join("mm.sqlite3");

    let schema_before = run_json(["--db", path_str(&db), "db", "schema-version"]);
    assert_eq!(as_i64(&schema_before, "current_version"), 0);

    let dry_run = run_json(["--db", path_str(&db), "db", "migrate", "--dry-run"]);
    assert_eq!(as_i64(&dry_run, "current_version"), 0);
    assert_eq!(
        dry_run
            .get("would_apply_versions")
            .and_then(Value::as_array)
            .map(std::vec::Vec::len)
            .unwrap_or_default(),
        2
    );

    let schema_after_dry_run = run_json(["--db", path_str(&db), "db", "schema-version"]);
    assert_eq!(as_i64(&schema_after_dry_run, "current_version"), 0);

    let migrate = run_json(["--db", path_str(&db), "db", "migrate"]);
    assert_eq!(as_i64(&migrate, "after_version"), 2);

    let _ = submit(&db, &answers_csv(3));

    let integrity = run_json(["--db", path_str(&db), "db", "integrity-check"]);
    assert!(integrity.get("quick_check_ok").and_then(Value::as_bool).unwrap_or(false));
    assert_eq!(
        integrity.get("undecodable_result_ids").and_then(Value::as_array).map(Vec::len),
        Some(0)
    );

    let _ = fs::remove_dir_all(&sandbox);
}

// Test IDs: TCLI-002
#[test]
fn submit_show_stats_and_delete_flow_is_consistent() {
    let sandbox = unique_temp_dir("majormatch-cli-flow");
    let db = sandbox.join("mm.sqlite3");

    let submitted = submit(&db, &answers_csv(4));
    let id = as_str(&submitted, "id").to_string();
    assert_eq!(id.len(), 8);
    assert_eq!(as_str(&submitted, "url"), format!("/result/{id}"));
    assert_eq!(submitted.get("top_departments").and_then(Value::as_array).map(Vec::len), Some(3));
    assert_eq!(as_str(&submitted, "created_at"), FIXED_SUBMITTED_AT);

    let shown = run_json([
        "--db",
        path_str(&db),
        "results",
        "show",
        "--id",
        &id,
        "--as-of",
        FIXED_SUBMITTED_AT,
    ]);
    assert_eq!(shown.get("top_departments"), submitted.get("top_departments"));
    assert_eq!(shown.get("personality"), submitted.get("personality"));

    let stats =
        run_json(["--db", path_str(&db), "results", "stats", "--as-of", FIXED_SUBMITTED_AT]);
    assert_eq!(as_i64(&stats, "total_results"), 1);
    assert_eq!(as_i64(&stats, "active_results"), 1);

    let deleted = run_json(["--db", path_str(&db), "results", "delete", "--id", &id]);
    assert_eq!(as_str(&deleted, "deleted_id"), id);

    let missing = run_mm(["--db", path_str(&db), "results", "show", "--id", &id]);
    assert!(!missing.status.success());
    let stderr = String::from_utf8_lossy(&missing.stderr);
    assert!(stderr.contains("not found"), "unexpected stderr: {stderr}");

    let _ = fs::remove_dir_all(&sandbox);
}

// Test IDs: TCLI-003
#[test]
fn invalid_answers_fail_without_storing_anything() {
    let sandbox = unique_temp_dir("majormatch-cli-invalid");
    let db = sandbox.join("mm.sqlite3");

    let mut answers = vec!["3"; 20];
    answers[1] = "";
    let output = run_mm([
        "--db",
        path_str(&db),
        "quiz",
        "submit",
        "--answers",
        &answers.join(","),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("answer 2 is missing"), "unexpected stderr: {stderr}");

    let too_high = run_mm(["--db", path_str(&db), "quiz", "submit", "--answers", &answers_csv(6)]);
    assert!(!too_high.status.success());

    let not_a_number =
        run_mm(["--db", path_str(&db), "quiz", "submit", "--answers", "a,b,c"]);
    assert!(!not_a_number.status.success());
    let stderr = String::from_utf8_lossy(&not_a_number.stderr);
    assert!(stderr.contains("invalid answer at position 1"), "unexpected stderr: {stderr}");

    let stats = run_json(["--db", path_str(&db), "results", "stats"]);
    assert_eq!(as_i64(&stats, "total_results"), 0);

    let _ = fs::remove_dir_all(&sandbox);
}

// Test IDs: TCLI-004
#[test]
fn purge_expired_removes_results_past_their_ttl() {
    let sandbox = unique_temp_dir("majormatch-cli-purge");
    let db = sandbox.join("mm.sqlite3");

    let _ = submit(&db, &answers_csv(2));
    let kept = run_json([
        "--db",
        path_str(&db),
        "quiz",
        "submit",
        "--answers",
        &answers_csv(5),
        "--submitted-at",
        FIXED_SUBMITTED_AT,
        "--no-expiry",
    ]);
    assert!(kept.get("expires_at").is_some_and(Value::is_null));

    let purged = run_json([
        "--db",
        path_str(&db),
        "db",
        "purge-expired",
        "--as-of",
        "2024-01-01T00:00:00Z",
    ]);
    assert_eq!(as_i64(&purged, "purged"), 1);

    let stats = run_json(["--db", path_str(&db), "results", "stats"]);
    assert_eq!(as_i64(&stats, "total_results"), 1);

    let _ = fs::remove_dir_all(&sandbox);
}

// Test IDs: TCLI-005
#[test]
fn question_and_catalog_commands_read_the_bundled_catalog() {
    let sandbox = unique_temp_dir("majormatch-cli-questions");
    let db = sandbox.join("mm.sqlite3");

    let list = run_json(["--db", path_str(&db), "questions", "list"]);
    assert_eq!(as_i64(&list, "total"), 20);

    let shown = run_json(["--db", path_str(&db), "questions", "show", "--id", "3"]);
    assert_eq!(as_str(&shown, "aptitude_type"), "logical");

    let by_type =
        run_json(["--db", path_str(&db), "questions", "aptitude", "--type", "logical"]);
    assert_eq!(as_i64(&by_type, "count"), 2);

    let unknown = run_mm(["--db", path_str(&db), "questions", "aptitude", "--type", "telepathy"]);
    assert!(!unknown.status.success());

    let validated = run_json(["catalog", "validate"]);
    assert_eq!(as_str(&validated, "source"), "bundled");
    assert_eq!(as_i64(&validated, "departments"), 70);

    let broken = sandbox.join("broken.json");
    fs::write(&broken, r#"{"questions": [], "departments": []}"#)
        .unwrap_or_else(|err| panic!("failed to write catalog fixture: {err}"));
    let rejected = run_mm(["--catalog", path_str(&broken), "catalog", "validate"]);
    assert!(!rejected.status.success());

    let _ = fs::remove_dir_all(&sandbox);
}

// Test IDs: TCLI-006
#[test]
fn cli_outputs_validate_against_versioned_schemas() {
    let sandbox = unique_temp_dir("majormatch-contract-schemas");
    let db = sandbox.join("schema.sqlite3");

    let schema_version = run_json(["--db", path_str(&db), "db", "schema-version"]);
    validate_schema("db-schema-version.response.schema.json", &schema_version);

    let dry_run = run_json(["--db", path_str(&db), "db", "migrate", "--dry-run"]);
    validate_schema("db-migrate.response.schema.json", &dry_run);

    let migrate = run_json(["--db", path_str(&db), "db", "migrate"]);
    validate_schema("db-migrate.response.schema.json", &migrate);

    let list = run_json(["--db", path_str(&db), "questions", "list"]);
    validate_schema("question-list.response.schema.json", &list);

    let mixed = "5,1,4,2,3,3,2,4,1,5,5,5,1,1,4,4,2,2,3,3";
    let submitted = submit(&db, mixed);
    validate_schema("quiz-result.response.schema.json", &submitted);

    let stats = run_json(["--db", path_str(&db), "results", "stats"]);
    validate_schema("result-stats.response.schema.json", &stats);

    let _ = fs::remove_dir_all(&sandbox);
}
