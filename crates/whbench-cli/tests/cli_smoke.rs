use assert_cmd::Command;

use predicates::str::contains;
use std::fs;
use tempfile::TempDir;

const CATALOG: &str = r#"
queries:
  - description: Query-1
    sql: SELECT 1
  - description: Query-2
    sql: SELECT bad_col FROM ${schema}.orders
"#;

fn whbench() -> Command {
    let mut cmd = Command::cargo_bin("whbench").unwrap();
    cmd.env_clear();
    cmd
}

#[test]
fn test_fake_run_writes_csv() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("catalog.yaml");
    let output = dir.path().join("stats.csv");
    fs::write(&catalog, CATALOG).unwrap();

    whbench()
        .args(["run", "--backend", "fake", "--delay-ms", "0", "--var", "schema=tpch"])
        .arg("--catalog")
        .arg(&catalog)
        .arg("--output")
        .arg(&output)
        .env("QUERY_TAG", "smoke")
        .assert()
        .success()
        .stderr(contains("Query-2"))
        .stderr(contains("All queries executed successfully"));

    let text = fs::read_to_string(&output).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("query_description,response_time_ms,official_time_ms"));
    assert!(lines[1].starts_with("Query-1,"));
    assert!(lines[1].contains(",fake,in-memory,Linear,smoke,"));
}

#[test]
fn test_strict_run_with_failure_exits_1() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("catalog.yaml");
    let output = dir.path().join("stats.csv");
    fs::write(&catalog, CATALOG).unwrap();

    whbench()
        .args(["run", "--backend", "fake", "--delay-ms", "0", "--strict", "--var", "schema=tpch"])
        .arg("--catalog")
        .arg(&catalog)
        .arg("--output")
        .arg(&output)
        .env("WHBENCH_FAKE_FAIL_ON", "bad_col")
        .assert()
        .code(1)
        .stderr(contains("simulated failure"));

    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(text.lines().count(), 3);
    assert!(text.contains("Query-2,-1.0,"));
}

#[test]
fn test_missing_credentials_exit_2_without_output() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("catalog.yaml");
    let output = dir.path().join("stats.csv");
    fs::write(&catalog, CATALOG).unwrap();

    whbench()
        .args(["run", "--backend", "snowflake"])
        .arg("--catalog")
        .arg(&catalog)
        .arg("--output")
        .arg(&output)
        .assert()
        .code(2)
        .stderr(contains("SNOWFLAKE_ACCOUNT"));

    assert!(!output.exists());
}

#[test]
fn test_unknown_placeholder_is_config_error() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("catalog.yaml");
    fs::write(&catalog, CATALOG).unwrap();

    whbench()
        .args(["run", "--backend", "fake", "--delay-ms", "0"])
        .arg("--catalog")
        .arg(&catalog)
        .arg("--output")
        .arg(dir.path().join("stats.csv"))
        .assert()
        .code(2)
        .stderr(contains("unknown variable '${schema}'"));
}

#[test]
fn test_catalog_json_preview() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("catalog.yaml");
    fs::write(&catalog, CATALOG).unwrap();

    whbench()
        .args(["catalog", "--backend", "redshift", "--format", "json", "--var", "schema=sf1"])
        .arg("--catalog")
        .arg(&catalog)
        .assert()
        .success()
        .stdout(contains("SELECT bad_col FROM sf1.orders"));
}

#[test]
fn test_generate_partsupp() {
    let dir = TempDir::new().unwrap();
    let out = dir.path().join("data");

    whbench()
        .args([
            "generate-partsupp",
            "--total-records",
            "25",
            "--batch-size",
            "10",
            "--seed",
            "3",
        ])
        .arg("--output-dir")
        .arg(&out)
        .assert()
        .success();

    for i in 1..=3 {
        assert!(out.join(format!("partsupp_batch_{}.csv", i)).exists());
    }
    let last = fs::read_to_string(out.join("partsupp_batch_3.csv")).unwrap();
    assert_eq!(last.lines().count(), 6);
}

#[test]
fn test_version() {
    whbench()
        .arg("version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unreachable_backend_exits_3_without_output() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("catalog.yaml");
    let output = dir.path().join("stats.csv");
    fs::write(&catalog, CATALOG).unwrap();

    whbench()
        .args(["run", "--backend", "redshift", "--delay-ms", "0"])
        .arg("--catalog")
        .arg(&catalog)
        .arg("--output")
        .arg(&output)
        .env("REDSHIFT_HOST", "127.0.0.1")
        .env("REDSHIFT_PORT", "1")
        .env("REDSHIFT_DATABASE", "dev")
        .env("REDSHIFT_USER", "bench")
        .env("REDSHIFT_PASSWORD", "secret")
        .env("REDSHIFT_SSLMODE", "disable")
        .assert()
        .code(3)
        .stderr(contains("connection error"))
        .stderr(contains("redshift"));

    assert!(!output.exists());
}

#[test]
fn test_dotenv_file_supplies_environment() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("catalog.yaml");
    let output = dir.path().join("stats.csv");
    fs::write(&catalog, CATALOG).unwrap();
    fs::write(
        dir.path().join(".env"),
        "WHBENCH_BACKEND=fake\nWHBENCH_FAKE_FAIL_ON=bad_col\nquery_tag=from-dotenv\n",
    )
    .unwrap();

    whbench()
        .current_dir(dir.path())
        .args(["run", "--delay-ms", "0", "--strict", "--var", "schema=tpch"])
        .arg("--catalog")
        .arg(&catalog)
        .arg("--output")
        .arg(&output)
        .assert()
        .code(1);

    let text = fs::read_to_string(&output).unwrap();
    assert!(text.contains(",fake,in-memory,Linear,from-dotenv,"));
    assert!(text.contains("Query-2,-1.0,"));
}

#[test]
fn test_unwritable_output_exits_4() {
    let dir = TempDir::new().unwrap();
    let catalog = dir.path().join("catalog.yaml");
    let blocker = dir.path().join("not-a-dir");
    fs::write(&catalog, CATALOG).unwrap();
    fs::write(&blocker, "").unwrap();

    whbench()
        .args(["run", "--backend", "fake", "--delay-ms", "0", "--var", "schema=tpch"])
        .arg("--catalog")
        .arg(&catalog)
        .arg("--output")
        .arg(blocker.join("stats.csv"))
        .assert()
        .code(4)
        .stderr(contains("failed to record result of 'Query-1'"));
}
