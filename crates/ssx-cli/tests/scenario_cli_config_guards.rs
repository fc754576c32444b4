//! Scenario: config handling at the CLI edge.
//!
//! # Invariants under test
//! - `config-hash` prints a stable hash for the checked-in base config.
//! - A literal secret in YAML aborts before anything else happens.
//! - Keys no command reads are reported on stderr.

use std::path::PathBuf;

use predicates::prelude::*;

fn repo_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("..").join("..")
}

#[test]
fn config_hash_prints_hash_and_canonical_json() -> anyhow::Result<()> {
    let base = repo_root().join("config").join("base.yaml");

    let out = assert_cmd::Command::cargo_bin("ssx")?
        .arg("config-hash")
        .arg(&base)
        .assert()
        .success()
        .stdout(predicate::str::starts_with("config_hash="))
        .get_output()
        .stdout
        .clone();

    let text = String::from_utf8(out)?;
    let hash = text
        .lines()
        .next()
        .and_then(|l| l.strip_prefix("config_hash="))
        .unwrap_or_default();
    assert_eq!(hash.len(), 64, "sha256 hex expected, got {hash:?}");
    assert!(text.contains("\"erp-order-status-update-queue\""));

    // Same input, same hash.
    assert_cmd::Command::cargo_bin("ssx")?
        .arg("config-hash")
        .arg(&base)
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("config_hash={hash}")));
    Ok(())
}

#[test]
fn literal_secret_in_yaml_is_refused() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("leaky.yaml");
    std::fs::write(
        &path,
        "auth:\n  realm_id: \"9130\"\n  access_token: \"eyJhbGciOiJIUzI1NiJ9.payload.sig\"\n",
    )?;

    assert_cmd::Command::cargo_bin("ssx")?
        .arg("config-hash")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("CONFIG_SECRET_DETECTED"))
        .stderr(predicate::str::contains("eyJhbGci").not());
    Ok(())
}

#[test]
fn unread_config_keys_are_warned_about() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let overlay = dir.path().join("overlay.yaml");
    std::fs::write(&overlay, "queue:\n  batch_sise: 20\n")?;

    // Fails later for lack of a database; the warning comes first.
    assert_cmd::Command::cargo_bin("ssx")?
        .env_remove(ssx_db::ENV_DB_URL)
        .arg("produce")
        .arg("--once")
        .arg("--config")
        .arg(repo_root().join("config").join("base.yaml"))
        .arg("--config")
        .arg(&overlay)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "WARN: config key /queue/batch_sise is not read by any command",
        ))
        .stderr(predicate::str::contains(ssx_db::ENV_DB_URL));
    Ok(())
}

#[test]
fn db_commands_require_database_url() -> anyhow::Result<()> {
    assert_cmd::Command::cargo_bin("ssx")?
        .env_remove(ssx_db::ENV_DB_URL)
        .args(["db", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing env var SSX_DATABASE_URL"));
    Ok(())
}
