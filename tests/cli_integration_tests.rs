//! CLI surface tests for the vpnsync binary

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn missing_config_file_exits_with_error() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("vpnsync")
        .unwrap()
        .current_dir(dir.path())
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn malformed_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("vpnsync.toml");
    std::fs::write(&config, "this is not toml [").unwrap();

    Command::cargo_bin("vpnsync")
        .unwrap()
        .arg(&config)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn config_missing_required_keys_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("vpnsync.toml");
    std::fs::write(
        &config,
        r#"
        [ftp]
        host = "ftp.example.com"
        username = "sync"
        password = "secret"
        "#,
    )
    .unwrap();

    Command::cargo_bin("vpnsync")
        .unwrap()
        .arg(&config)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Configuration error"));
}

#[test]
fn unreachable_remote_aborts_with_fetch_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("vpnsync.toml");
    std::fs::write(
        &config,
        format!(
            r#"
            [ftp]
            host = "127.0.0.1"
            port = 1
            username = "sync"
            password = "secret"
            timeout = 1

            [openvpn]
            remote_path = "/configs"
            remote_filename = "client.ovpn"
            local_openvpn_path = "{}"
            local_config_filename = "client.conf"
            "#,
            dir.path().join("openvpn").display(),
        ),
    )
    .unwrap();

    Command::cargo_bin("vpnsync")
        .unwrap()
        .arg(&config)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::contains("Run aborted"));

    // Aborted before any local mutation
    assert!(!dir.path().join("openvpn/client.conf").exists());
}

#[test]
fn version_flag_prints_version() {
    Command::cargo_bin("vpnsync")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
