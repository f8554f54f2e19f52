use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn wetten_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("wetten");
    path
}

const CATALOG_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<BWBIdServiceResultaat>
  <RegelingInfoLijst>
    <RegelingInfo>
      <BWBId>BWBR0001840</BWBId>
      <OfficieleTitel>Grondwet voor het Koninkrijk der Nederlanden</OfficieleTitel>
      <CiteertitelLijst>
        <Citeertitel>
          <titel>Grondwet</titel>
          <status>officieel</status>
        </Citeertitel>
      </CiteertitelLijst>
      <RegelingSoort>wet</RegelingSoort>
    </RegelingInfo>
    <RegelingInfo>
      <BWBId>BWBR0005537</BWBId>
      <OfficieleTitel>Algemene wet bestuursrecht</OfficieleTitel>
      <RegelingSoort>wet</RegelingSoort>
    </RegelingInfo>
    <RegelingInfo>
      <BWBId>BWBR0002226</BWBId>
      <OfficieleTitel>Besluit</OfficieleTitel>
      <RegelingSoort>AMvB</RegelingSoort>
    </RegelingInfo>
  </RegelingInfoLijst>
</BWBIdServiceResultaat>
"#;

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Zipped catalog, as published by the source
    let file = fs::File::create(root.join("BWBIdList.xml.zip")).unwrap();
    let mut writer = zip::ZipWriter::new(file);
    writer
        .start_file("BWBIdList.xml", zip::write::SimpleFileOptions::default())
        .unwrap();
    writer.write_all(CATALOG_XML.as_bytes()).unwrap();
    writer.finish().unwrap();

    // Nothing listens here; sync tests that need a source live in sync_e2e.rs
    let config_content = format!(
        r#"[db]
path = "{}/data/wetten.sqlite"

[source]
base_url = "http://127.0.0.1:9/xml.php"
timeout_secs = 2

[sync]
concurrency = 2
kind = "wet"
"#,
        root.display()
    );

    let config_path = config_dir.join("wetten.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_wetten(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = wetten_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run wetten binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn catalog_path(config_path: &Path) -> String {
    config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("BWBIdList.xml.zip")
        .to_str()
        .unwrap()
        .to_string()
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) = run_wetten(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully"));
    assert!(tmp.path().join("data/wetten.sqlite").exists());
}

#[test]
fn test_init_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, success) = run_wetten(&config_path, &["init"]);
    assert!(success);
    let (_, stderr, success) = run_wetten(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_catalog_from_file() {
    let (_tmp, config_path) = setup_test_env();
    run_wetten(&config_path, &["init"]);

    let catalog = catalog_path(&config_path);
    let (stdout, stderr, success) = run_wetten(&config_path, &["catalog", "--file", &catalog]);
    assert!(success, "catalog failed: {}", stderr);
    assert!(stdout.contains("documents stored: 3"), "got: {}", stdout);
    assert!(stdout.contains("selected for sync: 2 (kind: wet)"), "got: {}", stdout);
}

#[test]
fn test_status_counts_documents() {
    let (_tmp, config_path) = setup_test_env();
    run_wetten(&config_path, &["init"]);
    let catalog = catalog_path(&config_path);
    run_wetten(&config_path, &["catalog", "--file", &catalog]);

    let (stdout, stderr, success) = run_wetten(&config_path, &["status"]);
    assert!(success, "status failed: {}", stderr);
    assert!(stdout.contains("Archive Status"));
    assert!(stdout.contains("Documents:   3"), "got: {}", stdout);
    assert!(stdout.contains("Snapshots:   0"), "got: {}", stdout);
}

#[test]
fn test_reset_clears_catalog() {
    let (_tmp, config_path) = setup_test_env();
    run_wetten(&config_path, &["init"]);
    let catalog = catalog_path(&config_path);
    run_wetten(&config_path, &["catalog", "--file", &catalog]);

    let (_, stderr, success) = run_wetten(&config_path, &["init", "--reset"]);
    assert!(success, "reset failed: {}", stderr);

    let (stdout, _, _) = run_wetten(&config_path, &["status"]);
    assert!(stdout.contains("Documents:   0"), "got: {}", stdout);
}

#[test]
fn test_versions_of_unsynced_document() {
    let (_tmp, config_path) = setup_test_env();
    run_wetten(&config_path, &["init"]);

    let (stdout, stderr, success) = run_wetten(&config_path, &["versions", "BWBR0001840"]);
    assert!(success, "versions failed: {}", stderr);
    assert!(stdout.contains("BWBR0001840: 0 version(s)"));
}

#[test]
fn test_get_missing_document_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_wetten(&config_path, &["init"]);

    let (_, stderr, success) = run_wetten(&config_path, &["get", "BWBR0001840"]);
    assert!(!success);
    assert!(stderr.contains("document not found: BWBR0001840"), "got: {}", stderr);
}

#[test]
fn test_get_rejects_bad_date() {
    let (_tmp, config_path) = setup_test_env();
    run_wetten(&config_path, &["init"]);

    let (_, stderr, success) =
        run_wetten(&config_path, &["get", "BWBR0001840", "--date", "yesterday"]);
    assert!(!success);
    assert!(stderr.contains("invalid date: yesterday"), "got: {}", stderr);
}

#[test]
fn test_sync_against_unreachable_source_aborts_scans() {
    let (_tmp, config_path) = setup_test_env();
    run_wetten(&config_path, &["init"]);

    let (stdout, stderr, success) = run_wetten(
        &config_path,
        &["sync", "--id", "BWBR0001840", "--progress", "off"],
    );
    assert!(success, "sync failed: {}", stderr);
    assert!(stdout.contains("documents scanned: 1"), "got: {}", stdout);
    assert!(stdout.contains("aborted: 1"), "got: {}", stdout);
    assert!(stdout.contains("new versions: 0"), "got: {}", stdout);
}

#[test]
fn test_sync_rejects_zero_concurrency() {
    let (_tmp, config_path) = setup_test_env();
    run_wetten(&config_path, &["init"]);

    let (_, stderr, success) = run_wetten(&config_path, &["sync", "--concurrency", "0"]);
    assert!(!success);
    assert!(stderr.contains("--concurrency must be >= 1"));
}

#[test]
fn test_missing_config_fails() {
    let (_, stderr, success) = run_wetten(Path::new("/nonexistent/wetten.toml"), &["status"]);
    assert!(!success);
    assert!(!stderr.is_empty());
}
