//! CLI argument parsing tests: verify that subcommands, required arguments
//! and flag spellings are accepted or rejected as expected.

use assert_cmd::Command;

#[test]
fn test_help_runs() {
    Command::cargo_bin("imgsync")
        .unwrap()
        .arg("--help")
        .assert()
        .success();
}

#[test]
fn test_version_runs() {
    Command::cargo_bin("imgsync")
        .unwrap()
        .arg("--version")
        .assert()
        .success();
}

#[test]
fn test_missing_subcommand_fails() {
    Command::cargo_bin("imgsync").unwrap().assert().failure();
}

#[test]
fn test_unknown_subcommand_fails() {
    Command::cargo_bin("imgsync")
        .unwrap()
        .arg("teleport")
        .assert()
        .failure();
}

#[test]
fn test_subcommand_helps_run() {
    for subcommand in ["hosts", "list", "save", "load", "sync"] {
        Command::cargo_bin("imgsync")
            .unwrap()
            .args([subcommand, "--help"])
            .assert()
            .success();
    }
}

#[test]
fn test_hosts_add_requires_name_and_address() {
    Command::cargo_bin("imgsync")
        .unwrap()
        .args(["hosts", "add", "build-box"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("ADDRESS"));
}

#[test]
fn test_hosts_remove_requires_a_host() {
    Command::cargo_bin("imgsync")
        .unwrap()
        .args(["hosts", "remove"])
        .assert()
        .failure();
}

#[test]
fn test_list_requires_a_host() {
    Command::cargo_bin("imgsync")
        .unwrap()
        .arg("list")
        .assert()
        .failure()
        .stderr(predicates::str::contains("HOST"));
}

#[test]
fn test_load_requires_files() {
    Command::cargo_bin("imgsync")
        .unwrap()
        .args(["load", "build-box"])
        .assert()
        .failure();
}

#[test]
fn test_sync_requires_from_and_to() {
    Command::cargo_bin("imgsync")
        .unwrap()
        .args(["sync", "--from", "build-box"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("--to"));
}

#[test]
fn test_global_flags_parse_after_the_subcommand() {
    Command::cargo_bin("imgsync")
        .unwrap()
        .args(["list", "build-box", "--progress", "-vv", "--help"])
        .assert()
        .success();
}

#[test]
fn test_hosts_file_flag_accepts_a_path() {
    Command::cargo_bin("imgsync")
        .unwrap()
        .args(["hosts", "--hosts-file", "/tmp/hosts.json", "--help"])
        .assert()
        .success();
}

#[test]
fn test_list_with_missing_hosts_file_reports_the_path() {
    Command::cargo_bin("imgsync")
        .unwrap()
        .args(["list", "build-box", "--hosts-file", "/no/such/hosts.json"])
        .assert()
        .failure()
        .stderr(predicates::str::contains("hosts.json"));
}
