//! End-to-end tests for the `dbclone` binary.
//!
//! These tests invoke the actual CLI binary with an isolated settings file
//! and store, and validate commands from a user's perspective. Nothing here
//! reaches a database server or remote host.

mod common;
use common::prelude::*;

const IMAGE: &str = "D:\\images\\DB1_2024.vhdx";

#[test]
fn test_help() {
    let fixture = TestFixture::new();
    fixture
        .command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Provision database clones"))
        .stdout(predicate::str::contains("images"))
        .stdout(predicate::str::contains("completions"));
}

#[test]
fn test_version() {
    let mut cmd = cargo_bin_cmd!("dbclone");
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_unknown_command_is_usage_error() {
    let fixture = TestFixture::new();
    fixture.command().arg("frobnicate").assert().code(2);
}

#[test]
fn test_new_requires_instance() {
    let fixture = TestFixture::new().with_file_store();
    fixture
        .command()
        .args(["new", "--latest", "-d", "DB1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("--sql-instance"));
}

#[test]
fn test_init_writes_settings_and_store() {
    let fixture = TestFixture::new();
    let store_dir = fixture.path().join("registry");

    fixture
        .command()
        .args(["init", "--backend", "file", "--store-path"])
        .arg(&store_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("[OK] Wrote"))
        .stdout(predicate::str::contains("Store ready"));

    fixture
        .child("config.yaml")
        .assert(predicate::str::contains("backend: file"));
    fixture
        .child("registry/clones.json")
        .assert(predicate::path::exists());
}

#[test]
fn test_init_refuses_to_overwrite() {
    let fixture = TestFixture::new().with_file_store();

    fixture
        .command()
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    fixture
        .command()
        .args(["init", "--force", "--backend", "sqlite", "--store-path"])
        .arg(fixture.path().join("registry.db"))
        .assert()
        .success();
    fixture
        .child("config.yaml")
        .assert(predicate::str::contains("backend: sqlite"));
}

#[test]
fn test_empty_store_listings() {
    let fixture = TestFixture::new().with_file_store();

    fixture
        .command()
        .arg("ls")
        .assert()
        .success()
        .stdout(predicate::str::contains("No clones registered."));
    fixture
        .command()
        .args(["ls", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
    fixture
        .command()
        .args(["hosts", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No hosts registered."));
}

#[test]
fn test_register_and_list_images() {
    for fixture in [
        TestFixture::new().with_file_store(),
        TestFixture::new().with_sqlite_store(),
    ] {
        fixture
            .command()
            .args(["images", "add", IMAGE, "-d", "DB1", "--size-mb", "2048"])
            .args(["--created-on", "2024-01-31T00:00:00Z"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Registered image 1 (DB1_2024) for DB1"));

        fixture
            .command()
            .args(["images", "ls"])
            .assert()
            .success()
            .stdout(predicate::str::contains("DB1_2024"))
            .stdout(predicate::str::contains("2024-01-31 00:00:00"));

        fixture
            .command()
            .args(["images", "ls", "--json", "-d", "DB1"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"ImageLocation\""))
            .stdout(predicate::str::contains("\"SizeMb\": 2048"));

        fixture
            .command()
            .args(["images", "add", IMAGE, "-d", "DB1"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Image already registered"));
    }
}

#[test]
fn test_new_invalid_request_exits_nonzero() {
    let fixture = TestFixture::new().with_file_store();
    fixture
        .command()
        .args(["new", "-s", "HOSTA", "--latest"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Invalid request"));

    fixture
        .command()
        .args(["hosts", "ls", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("[]"));
}

#[test]
fn test_bad_settings_file() {
    let fixture = TestFixture::new().with_settings("clone:\n  subdirectory: ''\n");
    fixture
        .command()
        .arg("ls")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load settings"));
}

#[test]
fn test_env_overrides_store() {
    let fixture = TestFixture::new().with_file_store();
    let db = fixture.path().join("override.db");

    fixture
        .command()
        .env("DBCLONE_STORE_BACKEND", "sqlite")
        .env("DBCLONE_STORE_PATH", &db)
        .args(["images", "add", IMAGE, "-d", "DB1"])
        .assert()
        .success();

    assert!(db.exists());
    fixture
        .command()
        .args(["images", "ls"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No images registered."));
}

#[test]
fn test_completions() {
    let fixture = TestFixture::new();
    fixture
        .command()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dbclone"));
}
