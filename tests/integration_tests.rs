//! Integration tests for the hikebot CLI.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a hikebot Command isolated from the caller's environment
fn hikebot(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("hikebot");
    cmd.current_dir(dir.path())
        .env_remove("HIKEBOT_DB")
        .env_remove("HIKEBOT_HOST")
        .env_remove("HIKEBOT_PORT")
        .env("RUST_LOG", "info");
    cmd
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_help_lists_subcommands() {
        let dir = TempDir::new().unwrap();
        hikebot(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve"))
            .stdout(predicate::str::contains("init-db"))
            .stdout(predicate::str::contains("seed"));
    }

    #[test]
    fn test_version() {
        let dir = TempDir::new().unwrap();
        hikebot(&dir)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("hikebot"));
    }

    #[test]
    fn test_unknown_subcommand_fails() {
        let dir = TempDir::new().unwrap();
        hikebot(&dir).arg("hike").assert().failure();
    }
}

// =============================================================================
// Database Tests
// =============================================================================

mod init_db {
    use super::*;

    #[test]
    fn test_init_db_creates_file() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("data/hikebot.db");

        hikebot(&dir)
            .args(["init-db", "--db"])
            .arg(&db_path)
            .assert()
            .success();

        assert!(db_path.exists());
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("hikebot.db");

        for _ in 0..2 {
            hikebot(&dir)
                .arg("init-db")
                .arg("--db")
                .arg(&db_path)
                .assert()
                .success();
        }
    }

    #[test]
    fn test_config_file_sets_db_path() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("hikebot.toml"),
            "[server]\ndb_path = \"from-config.db\"\n",
        )
        .unwrap();

        hikebot(&dir).arg("init-db").assert().success();

        assert!(dir.path().join("from-config.db").exists());
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.toml"), "[server\nport = ").unwrap();

        hikebot(&dir)
            .args(["--config", "broken.toml", "init-db"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse hikebot.toml"));
    }
}

// =============================================================================
// Seed Tests (no network)
// =============================================================================

mod seed {
    use super::*;

    #[test]
    fn test_seed_rejects_malformed_point() {
        let dir = TempDir::new().unwrap();
        hikebot(&dir)
            .args(["seed", "--point", "north-ish"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("expected LAT,LON"));
    }

    #[test]
    fn test_seed_rejects_nonpositive_radius() {
        let dir = TempDir::new().unwrap();
        hikebot(&dir)
            .args(["seed", "--point", "34.1,-118.3", "--dist", "0"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--dist must be positive"));
    }
}
