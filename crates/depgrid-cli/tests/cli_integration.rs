use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

fn project() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap_or_else(|err| panic!("failed to create temp dir: {err}"));
    let root = dir
        .path()
        .canonicalize()
        .unwrap_or_else(|err| panic!("failed to canonicalize temp dir: {err}"));
    (dir, root)
}

fn run_dg<I, S>(root: &Path, args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_dg"))
        .arg("--root")
        .arg(root)
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute dg binary: {err}"))
}

fn run_json<I, S>(root: &Path, args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_dg(root, args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "dg command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    let value: Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"));
    assert_eq!(value["contract_version"], "cli.v1");
    value
}

fn run_failure<I, S>(root: &Path, args: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_dg(root, args);
    assert!(!output.status.success(), "dg command should have failed");
    String::from_utf8_lossy(&output.stderr).to_string()
}

fn as_u64(value: &Value, key: &str) -> u64 {
    value
        .get(key)
        .and_then(Value::as_u64)
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

fn write_file(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .unwrap_or_else(|err| panic!("failed to create {}: {err}", parent.display()));
    }
    fs::write(path, body).unwrap_or_else(|err| panic!("failed to write {}: {err}", path.display()));
}

fn read_file(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("failed to read {}: {err}", path.display()))
}

fn write_registry(root: &Path, entries: &[(&str, &str, bool)]) -> PathBuf {
    let entries = entries
        .iter()
        .map(|(key, relative, is_directory)| {
            let path = root.join(relative);
            serde_json::json!({
                "key_string": key,
                "norm_path": path_str(&path),
                "parent_path": path.parent().map(path_str).unwrap_or_default(),
                "is_directory": is_directory,
            })
        })
        .collect::<Vec<_>>();
    let registry = root.join("registry.json");
    write_file(&registry, &Value::Array(entries).to_string());
    registry
}

fn doc_registry(root: &Path) -> PathBuf {
    write_registry(
        root,
        &[("1A", "docs", true), ("1A1", "docs/a.md", false), ("1A2", "docs/b.md", false)],
    )
}

fn write_suggestions(root: &Path, body: &str) -> PathBuf {
    let path = root.join("suggestions.json");
    write_file(&path, body);
    path
}

fn doc_tracker(root: &Path) -> PathBuf {
    root.join("cline_docs/doc_tracker.md")
}

#[test]
fn update_creates_doc_tracker_and_show_reads_it() {
    let (_dir, root) = project();
    let registry = doc_registry(&root);
    let suggestions =
        write_suggestions(&root, r#"[{"source": "1A1", "target": "1A2", "relation": "<"}]"#);

    let report = run_json(
        &root,
        [
            "tracker",
            "update",
            "--kind",
            "doc",
            "--registry",
            path_str(&registry),
            "--suggestions",
            path_str(&suggestions),
            "--new-key",
            "1A1",
        ],
    );
    assert_eq!(report["created"], true);
    assert_eq!(as_u64(&report, "key_count"), 3);
    assert_eq!(report["suggestions"]["applied"], 1);
    assert_eq!(as_str(&report, "last_key_edit"), "Assigned keys: 1A1");

    let tracker = doc_tracker(&root);
    let shown = run_json(&root, ["tracker", "show", "--tracker", path_str(&tracker)]);
    assert_eq!(shown["key_order"], serde_json::json!(["1A", "1A1", "1A2"]));
    assert_eq!(as_str(&shown["grid"], "1A1"), "po<");
    assert_eq!(as_str(&shown["grid"], "1A2"), "ppo");
}

#[test]
fn validate_reports_hand_edited_damage() {
    let (_dir, root) = project();
    let tracker = root.join("broken.md");
    write_file(
        &tracker,
        "---KEY_DEFINITIONS_START---\nA: /a\nB: /b\n---KEY_DEFINITIONS_END---\n---GRID_START---\nX A B\nA = o<<\n---GRID_END---\n",
    );

    let report = run_json(&root, ["tracker", "validate", "--tracker", path_str(&tracker)]);
    assert_eq!(report["valid"], false);
    let kinds = report["issues"]
        .as_array()
        .unwrap_or_else(|| panic!("issues should be an array: {report}"))
        .iter()
        .map(|issue| as_str(issue, "kind").to_string())
        .collect::<Vec<_>>();
    assert_eq!(kinds, vec!["undecodable", "missing_row"]);
}

#[test]
fn remove_key_and_missing_tracker_failure() {
    let (_dir, root) = project();
    let registry = doc_registry(&root);
    run_json(&root, ["tracker", "update", "--kind", "doc", "--registry", path_str(&registry)]);
    let tracker = doc_tracker(&root);

    let report =
        run_json(&root, ["tracker", "remove-key", "--tracker", path_str(&tracker), "--key", "1A2"]);
    assert_eq!(report["removed"], true);
    assert_eq!(as_u64(&report, "keys_after"), 2);
    assert!(read_file(&tracker).contains("last_KEY_edit: Removed key: 1A2"));

    let missing = root.join("cline_docs/absent.md");
    let stderr =
        run_failure(&root, ["tracker", "remove-key", "--tracker", path_str(&missing), "--key", "1A"]);
    assert!(stderr.contains("tracker file not found"), "stderr:\n{stderr}");
}

#[test]
fn remove_path_resolves_through_registry() {
    let (_dir, root) = project();
    let registry = doc_registry(&root);
    run_json(&root, ["tracker", "update", "--kind", "doc", "--registry", path_str(&registry)]);
    let tracker = doc_tracker(&root);
    let removed = root.join("docs/a.md");

    let report = run_json(
        &root,
        [
            "tracker",
            "remove-path",
            "--tracker",
            path_str(&tracker),
            "--path",
            path_str(&removed),
            "--registry",
            path_str(&registry),
        ],
    );
    assert_eq!(as_str(&report, "key"), "1A1");
    assert_eq!(as_u64(&report, "keys_before"), 3);
    assert_eq!(as_u64(&report, "keys_after"), 2);
}

#[test]
fn merge_writes_union_to_output() {
    let (_dir, root) = project();
    let primary = root.join("primary.md");
    let secondary = root.join("secondary.md");
    let merged = root.join("merged.md");
    write_file(
        &primary,
        "---KEY_DEFINITIONS_START---\nA: /a\nB: /b\n---KEY_DEFINITIONS_END---\n---GRID_START---\nA = o<\nB = po\n---GRID_END---\n",
    );
    write_file(
        &secondary,
        "---KEY_DEFINITIONS_START---\nB: /b\nC: /c\n---KEY_DEFINITIONS_END---\n---GRID_START---\nB = o<\nC = po\n---GRID_END---\n",
    );

    let report = run_json(
        &root,
        [
            "tracker",
            "merge",
            "--primary",
            path_str(&primary),
            "--secondary",
            path_str(&secondary),
            "--out",
            path_str(&merged),
        ],
    );
    assert_eq!(as_u64(&report, "merged_keys"), 3);
    assert!(as_str(&report, "last_grid_edit").starts_with("Merged from primary.md and secondary.md"));

    let shown = run_json(&root, ["tracker", "show", "--tracker", path_str(&merged)]);
    assert_eq!(as_str(&shown["grid"], "A"), "o<p");
    assert_eq!(as_str(&shown["grid"], "B"), "po<");
    assert_eq!(as_str(&shown["grid"], "C"), "ppo");
}

#[test]
fn export_csv_to_default_location() {
    let (_dir, root) = project();
    let registry = doc_registry(&root);
    let suggestions =
        write_suggestions(&root, r#"[{"source": "1A2", "target": "1A", "relation": "d"}]"#);
    run_json(
        &root,
        [
            "tracker",
            "update",
            "--kind",
            "doc",
            "--registry",
            path_str(&registry),
            "--suggestions",
            path_str(&suggestions),
        ],
    );
    let tracker = doc_tracker(&root);

    let report =
        run_json(&root, ["tracker", "export", "--tracker", path_str(&tracker), "--format", "csv"]);
    let output = PathBuf::from(as_str(&report, "output_path"));
    assert_eq!(output, root.join("cline_docs/doc_tracker_export.csv"));
    let csv = read_file(&output);
    assert!(csv.starts_with("Source Key,Source Path,Target Key,Target Path,Dependency Type\n"));
    assert!(csv.contains(&format!("1A2,{},1A,{},d", path_str(&root.join("docs/b.md")), path_str(&root.join("docs")))));
}

#[test]
fn module_update_needs_module_path() {
    let (_dir, root) = project();
    let registry = doc_registry(&root);
    let stderr =
        run_failure(&root, ["tracker", "update", "--kind", "module", "--registry", path_str(&registry)]);
    assert!(stderr.contains("module trackers need a module path"), "stderr:\n{stderr}");
}

#[test]
fn module_update_embeds_tracker_in_module_document() {
    let (_dir, root) = project();
    let registry = write_registry(
        &root,
        &[("1A", "src", true), ("1A1", "src/app.py", false), ("2A", "lib", true), ("2A1", "lib/util.py", false)],
    );
    let suggestions =
        write_suggestions(&root, r#"[{"source": "1A1", "target": "2A1", "relation": "<"}]"#);

    let report = run_json(
        &root,
        [
            "tracker",
            "update",
            "--kind",
            "module",
            "--module",
            "src",
            "--registry",
            path_str(&registry),
            "--suggestions",
            path_str(&suggestions),
        ],
    );
    let document = root.join("src/src_module.md");
    assert_eq!(PathBuf::from(as_str(&report, "tracker_path")), document);
    let text = read_file(&document);
    assert!(text.starts_with("# Module: src\n"));
    assert!(text.contains("---mini_tracker_start---\n---KEY_DEFINITIONS_START---"));
    assert!(text.trim_end().ends_with("---mini_tracker_end---"));
}

#[test]
fn config_show_reports_defaults_and_overrides() {
    let (_dir, root) = project();
    let defaults = run_json(&root, ["config", "show"]);
    assert_eq!(defaults["config_file_present"], false);
    assert_eq!(defaults["config"]["memory_dir"], "cline_docs");
    assert_eq!(defaults["config"]["backup_retention"], 2);
    assert_eq!(defaults["config"]["char_priority"]["x"], 5);

    write_file(&root.join(".depgrid.yaml"), "memory_dir: memory\nbackup_retention: 3\n");
    let overridden = run_json(&root, ["config", "show"]);
    assert_eq!(overridden["config_file_present"], true);
    assert_eq!(overridden["config"]["memory_dir"], "memory");
    assert_eq!(overridden["config"]["backup_retention"], 3);
}
