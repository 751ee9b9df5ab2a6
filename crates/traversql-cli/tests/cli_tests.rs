//! CLI integration tests for traversql.
//!
//! These tests cover argument parsing, help output and exit codes for
//! failures that happen before a database connection is attempted.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

const ENV_VARS: [&str; 6] = [
    "POSTGRES_HOST",
    "POSTGRES_PORT",
    "POSTGRES_DB",
    "POSTGRES_USER",
    "POSTGRES_PASSWORD",
    "POSTGRES_SSLMODE",
];

/// Get a command for the traversql binary with no database environment.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("traversql").unwrap();
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd
}

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("extract"))
        .stdout(predicate::str::contains("inspect"))
        .stdout(predicate::str::contains("health-check"));
}

#[test]
fn test_extract_subcommand_help() {
    cmd()
        .args(["extract", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--pk-fields"))
        .stdout(predicate::str::contains("--pk-values"))
        .stdout(predicate::str::contains("--output"))
        .stdout(predicate::str::contains("--included-tables"))
        .stdout(predicate::str::contains("--excluded-tables"))
        .stdout(predicate::str::contains("--included-schemas"))
        .stdout(predicate::str::contains("--follow-parents"))
        .stdout(predicate::str::contains("--follow-children"));
}

#[test]
fn test_extract_defaults() {
    cmd()
        .args(["extract", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[default: public]"))
        .stdout(predicate::str::contains("[default: id]"))
        .stdout(predicate::str::contains("[default: true]"));
}

#[test]
fn test_inspect_subcommand_help() {
    cmd()
        .args(["inspect", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--output-json"));
}

#[test]
fn test_health_check_command_exists() {
    cmd()
        .args(["health-check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Test the database connection"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("traversql"));
}

// =============================================================================
// Global Flags Tests
// =============================================================================

#[test]
fn test_log_format_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--log-format"))
        .stdout(predicate::str::contains("[default: text]"));
}

#[test]
fn test_verbosity_flag_exists() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--verbosity"))
        .stdout(predicate::str::contains("[default: info]"));
}

#[test]
fn test_short_config_flag() {
    cmd()
        .args(["-c", "some_config.yaml", "--help"])
        .assert()
        .success();
}

// =============================================================================
// Argument Errors
// =============================================================================

#[test]
fn test_extract_requires_table() {
    cmd()
        .args(["extract", "--pk-values", "1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--table"));
}

#[test]
fn test_extract_requires_pk_values() {
    cmd()
        .args(["extract", "--table", "users"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--pk-values"));
}

#[test]
fn test_follow_flags_take_a_value() {
    cmd()
        .args([
            "extract",
            "--table",
            "users",
            "--pk-values",
            "1",
            "--follow-parents",
            "maybe",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("maybe"));
}

#[test]
fn test_no_subcommand_shows_help() {
    cmd()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage:"));
}

// =============================================================================
// Exit Code Tests - Configuration Errors
// =============================================================================

#[test]
fn test_missing_environment_exits_with_code_2() {
    cmd()
        .args(["extract", "--table", "users", "--pk-values", "1"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("POSTGRES_HOST"));
}

#[test]
fn test_missing_config_file_exits_with_code_1() {
    // A missing file is an IO error, not a configuration error
    cmd()
        .args(["--config", "nonexistent_config_file.yaml", "health-check"])
        .assert()
        .code(1);
}

#[test]
fn test_invalid_yaml_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "invalid: yaml: content: [").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_required_fields_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  host: localhost").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2);
}

#[test]
fn test_invalid_ssl_mode_exits_with_code_2() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "source:").unwrap();
    writeln!(file, "  host: localhost").unwrap();
    writeln!(file, "  database: shop").unwrap();
    writeln!(file, "  user: app").unwrap();
    writeln!(file, "  ssl_mode: sometimes").unwrap();

    cmd()
        .args(["--config", file.path().to_str().unwrap(), "health-check"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("sometimes"));
}

#[test]
fn test_logs_stay_off_stdout() {
    cmd()
        .args(["--verbosity", "debug", "extract", "--table", "users", "--pk-values", "1"])
        .assert()
        .code(2)
        .stdout(predicate::str::is_empty());
}
