#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use predicates::str::contains;
use serde_json::Value;
use tempfile::TempDir;

/// `satchelctl` against a filesystem store in `temp`, acting as `tenant`.
fn satchelctl(temp: &TempDir, tenant: Option<&str>) -> Command {
    let mut cmd = Command::cargo_bin("satchelctl").unwrap();
    cmd.env("SATCHEL_CONFIG", temp.path().join("absent.toml"))
        .env("SATCHEL_STORE__TYPE", "filesystem")
        .env("SATCHEL_STORE__PATH", temp.path().join("tables"))
        .env("SATCHEL_APP_NAME", "cli")
        .env("RUST_LOG", "warn")
        .env_remove("SATCHEL_TENANT")
        .env_remove("SATCHEL_IDENTITY__TENANT_ID");
    if let Some(tenant) = tenant {
        cmd.arg("--tenant").arg(tenant);
    }
    cmd
}

fn stdout_lines(output: &std::process::Output) -> Vec<Value> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn cursor_from_stderr(output: &std::process::Output) -> Option<String> {
    String::from_utf8_lossy(&output.stderr)
        .lines()
        .find_map(|line| line.strip_prefix("cursor: ").map(str::to_string))
}

#[test]
fn put_get_remove_round_trip() {
    let temp = TempDir::new().unwrap();

    satchelctl(&temp, Some("cognito-abc"))
        .args(["put", "-t", "LEAF", "--id", "1", r#"{"title":"a"}"#])
        .assert()
        .success()
        .stdout("1\n");

    satchelctl(&temp, Some("cognito-abc"))
        .args(["get", "-t", "LEAF", "1"])
        .assert()
        .success()
        .stdout(contains("\"title\": \"a\""));

    assert!(temp.path().join("tables").join("cli.LEAF.json").exists());

    satchelctl(&temp, Some("cognito-abc"))
        .args(["remove", "-t", "LEAF", "1"])
        .assert()
        .success();

    satchelctl(&temp, Some("cognito-abc"))
        .args(["get", "-t", "LEAF", "1"])
        .assert()
        .failure()
        .stderr(contains("not found"));
}

#[test]
fn put_rejects_non_object_content() {
    let temp = TempDir::new().unwrap();
    satchelctl(&temp, Some("t"))
        .args(["put", "-t", "LEAF", "[1,2]"])
        .assert()
        .failure()
        .stderr(contains("must be a JSON object"));
}

#[test]
fn list_pages_with_cursor() {
    let temp = TempDir::new().unwrap();
    for (id, title) in [("1", "a"), ("2", "b"), ("3", "c")] {
        let content = format!(r#"{{"title":"{title}"}}"#);
        satchelctl(&temp, Some("t1"))
            .args(["put", "-t", "LEAF", "--id", id, content.as_str()])
            .assert()
            .success();
    }

    let first = satchelctl(&temp, Some("t1"))
        .args(["list", "-t", "LEAF", "--page-size", "2"])
        .output()
        .unwrap();
    assert!(first.status.success());
    let rows = stdout_lines(&first);
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["content"]["title"], "a");
    let cursor = cursor_from_stderr(&first).expect("cursor for remaining rows");

    let second = satchelctl(&temp, Some("t1"))
        .args(["list", "-t", "LEAF", "--page-size", "2", "--cursor", cursor.as_str()])
        .output()
        .unwrap();
    let rows = stdout_lines(&second);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["id"], "3");
    assert!(cursor_from_stderr(&second).is_none());

    let all = satchelctl(&temp, Some("t1"))
        .args(["list", "-t", "LEAF", "--page-size", "1", "--all", "--descending"])
        .output()
        .unwrap();
    let ids: Vec<Value> = stdout_lines(&all).into_iter().map(|r| r["id"].clone()).collect();
    assert_eq!(ids, vec!["3", "2", "1"]);
}

#[test]
fn scan_with_contains_filter() {
    let temp = TempDir::new().unwrap();
    for (id, title) in [("1", "maple leaf"), ("2", "oak"), ("3", "leaf pile")] {
        let content = format!(r#"{{"title":"{title}"}}"#);
        satchelctl(&temp, Some("t1"))
            .args(["put", "-t", "LEAF", "--id", id, content.as_str()])
            .assert()
            .success();
    }

    let output = satchelctl(&temp, Some("t1"))
        .args(["scan", "-t", "LEAF", "--contains", "content.title=leaf", "--all"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let mut ids: Vec<String> = stdout_lines(&output)
        .into_iter()
        .map(|r| r["id"].as_str().unwrap().to_string())
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["1", "3"]);

    let other = satchelctl(&temp, Some("t2"))
        .args(["scan", "-t", "LEAF", "--all"])
        .output()
        .unwrap();
    assert!(other.status.success());
    assert!(stdout_lines(&other).is_empty());
}

#[test]
fn rotate_migrates_entries_to_new_tenant() {
    let temp = TempDir::new().unwrap();
    satchelctl(&temp, Some("anon-1"))
        .args(["put", "-t", "LEAF", "--id", "1", r#"{"title":"draft"}"#])
        .assert()
        .success();

    let output = satchelctl(&temp, Some("anon-1"))
        .args(["rotate", "--to", "cognito-abc", "--link", "cognito", "-t", "LEAF"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stats: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(stats[0]["table"], "cli.LEAF");
    assert_eq!(stats[0]["migrated"], 1);
    assert_eq!(stats[0]["failed"], 0);

    satchelctl(&temp, Some("cognito-abc"))
        .args(["get", "-t", "LEAF", "1"])
        .assert()
        .success()
        .stdout(contains("draft"));

    satchelctl(&temp, Some("anon-1"))
        .args(["get", "-t", "LEAF", "1"])
        .assert()
        .failure();
}

#[test]
fn whoami_reports_identity() {
    let temp = TempDir::new().unwrap();
    let output = satchelctl(&temp, Some("cognito-abc"))
        .arg("whoami")
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["app_name"], "cli");
    assert_eq!(summary["backend"], "filesystem");
    assert_eq!(summary["identity"]["id"], "cognito-abc");
}

#[test]
fn missing_tenant_is_reported() {
    let temp = TempDir::new().unwrap();
    satchelctl(&temp, None)
        .arg("whoami")
        .assert()
        .failure()
        .stderr(contains("No tenant id configured"));
}

#[test]
fn config_file_supplies_tenant() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("satchel.toml");
    std::fs::write(
        &config_path,
        r#"
app_name = "fromfile"

[identity]
tenant_id = "file-tenant"
linked_providers = ["cognito"]
"#,
    )
    .unwrap();

    let output = satchelctl(&temp, None)
        .env("SATCHEL_CONFIG", &config_path)
        .env_remove("SATCHEL_APP_NAME")
        .arg("whoami")
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["app_name"], "fromfile");
    assert_eq!(summary["identity"]["id"], "file-tenant");
    assert_eq!(summary["identity"]["linked_providers"][0], "cognito");
}
