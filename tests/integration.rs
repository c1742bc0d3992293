use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn copilot_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("copilot");
    path
}

fn write_corpus(docs: &Path) {
    fs::create_dir_all(docs.join("precompiles")).unwrap();
    fs::write(
        docs.join("gas.md"),
        "---\ntitle: Gas\n---\n# Gas limit\n\nThe default gas limit is 8000000 per block.\n\n![diagram](img/gas.png)\n\nRaise it in the genesis feeConfig.",
    )
    .unwrap();
    fs::write(
        docs.join("precompiles/fee-manager.md"),
        "# Fee manager\n\nThe fee manager precompile lets admins change fee parameters at runtime.\n\nAdmins can add other admins.",
    )
    .unwrap();
    fs::write(
        docs.join("staking.mdx"),
        "# Staking\n\nValidators stake AVAX on the primary network to validate subnets.",
    )
    .unwrap();
    fs::write(docs.join("notes.txt"), "not part of the corpus").unwrap();
}

fn write_config(root: &Path, extra_chunking: &str) -> PathBuf {
    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[corpus]
root = "{root}/docs"

[chunking]
{extra_chunking}

[index]
path = "{root}/data/chroma_db"
collection = "avax_docs"

[retrieval]
k = 5

[embedding]
provider = "hashed"
dims = 256

[generation]
provider = "disabled"

[server]
bind = "127.0.0.1:0"

[logging]
level = "warn"
"#,
        root = root.display(),
        extra_chunking = extra_chunking
    );

    let config_path = config_dir.join("copilot.toml");
    fs::write(&config_path, config_content).unwrap();
    config_path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("docs"));
    let config_path = write_config(tmp.path(), "size = 120\noverlap = 20");
    (tmp, config_path)
}

fn run_copilot(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = copilot_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run copilot binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_index_builds_and_persists() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_copilot(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("index built"));
    assert!(stdout.contains("collection: avax_docs"));

    let location = tmp.path().join("data/chroma_db");
    assert!(location.join("index.sqlite").is_file());
    assert!(!tmp.path().join("data/chroma_db.partial").exists());
}

#[test]
fn test_index_second_run_skips() {
    let (_tmp, config_path) = setup_test_env();

    let (first, _, success1) = run_copilot(&config_path, &["index"]);
    assert!(success1, "first index failed");

    let (second, stderr, success2) = run_copilot(&config_path, &["index"]);
    assert!(success2, "second index failed: {}", stderr);
    assert!(second.contains("build skipped"));

    let chunks_line = |out: &str| {
        out.lines()
            .find(|l| l.trim_start().starts_with("chunks:"))
            .map(|l| l.trim().to_string())
    };
    assert_eq!(chunks_line(&first), chunks_line(&second));
}

#[test]
fn test_index_skip_does_not_need_corpus() {
    let (tmp, config_path) = setup_test_env();

    let (_, _, success) = run_copilot(&config_path, &["index"]);
    assert!(success);

    fs::remove_dir_all(tmp.path().join("docs")).unwrap();
    let (stdout, stderr, success) = run_copilot(&config_path, &["index"]);
    assert!(success, "skip should not read corpus: {}", stderr);
    assert!(stdout.contains("build skipped"));
}

#[test]
fn test_index_rebuild() {
    let (_tmp, config_path) = setup_test_env();

    run_copilot(&config_path, &["index"]);
    let (stdout, stderr, success) = run_copilot(&config_path, &["index", "--rebuild"]);
    assert!(success, "rebuild failed: {}", stderr);
    assert!(stdout.contains("cleared"));
    assert!(stdout.contains("index built"));
}

#[test]
fn test_search_finds_relevant_chunk() {
    let (_tmp, config_path) = setup_test_env();

    run_copilot(&config_path, &["index"]);
    let (stdout, stderr, success) =
        run_copilot(&config_path, &["search", "fee manager precompile admins", "--k", "2"]);
    assert!(success, "search failed: {}", stderr);

    let first = stdout.lines().next().unwrap_or_default();
    assert!(
        first.contains("precompiles/fee-manager.md"),
        "unexpected top hit: {}",
        stdout
    );
    assert!(stdout.contains("2. ["));
    assert!(!stdout.contains("3. ["));
}

#[test]
fn test_search_excerpts_are_normalized() {
    let (_tmp, config_path) = setup_test_env();

    run_copilot(&config_path, &["index"]);
    let (stdout, _, success) = run_copilot(&config_path, &["search", "default gas limit", "--k", "5"]);
    assert!(success);
    assert!(!stdout.contains("!["));
    assert!(!stdout.contains("title: Gas"));
    assert!(!stdout.contains("notes.txt"));
}

#[test]
fn test_search_without_index_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_copilot(&config_path, &["search", "gas"]);
    assert!(!success);
    assert!(stderr.contains("copilot index"));
}

#[test]
fn test_overlap_not_smaller_than_size_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write_corpus(&tmp.path().join("docs"));
    let config_path = write_config(tmp.path(), "size = 100\noverlap = 100");

    let (_, stderr, success) = run_copilot(&config_path, &["index"]);
    assert!(!success);
    assert!(stderr.contains("overlap"));
    assert!(!tmp.path().join("data/chroma_db").exists());
}

#[test]
fn test_missing_corpus_fails_index() {
    let tmp = TempDir::new().unwrap();
    let config_path = write_config(tmp.path(), "");

    let (_, stderr, success) = run_copilot(&config_path, &["index"]);
    assert!(!success);
    assert!(stderr.contains("does not exist"));
}

#[test]
fn test_ask_with_disabled_generator_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_copilot(&config_path, &["ask", "What is the default gas limit?"]);
    assert!(!success, "ask unexpectedly succeeded: {}", stdout);
    assert!(stderr.contains("disabled"));
}

#[test]
fn test_ask_rejects_non_object_config_json() {
    let (tmp, config_path) = setup_test_env();
    let config_json = tmp.path().join("subnet.json");
    fs::write(&config_json, "[1, 2, 3]").unwrap();

    let (_, stderr, success) = run_copilot(
        &config_path,
        &["ask", "gas?", "--config-json", config_json.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("JSON object"));
}
