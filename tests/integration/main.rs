//! Integration tests for pyforge

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;

    fn pyforge() -> Command {
        cargo_bin_cmd!("pyforge")
    }

    #[test]
    fn help_displays() {
        pyforge()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("source-build fallback"));
    }

    #[test]
    fn version_displays() {
        pyforge()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("pyforge"));
    }

    #[test]
    fn tags_lists_bundled_catalog() {
        pyforge()
            .arg("tags")
            .assert()
            .success()
            .stdout(predicate::str::contains("3.6.15").and(predicate::str::contains("tags")));
    }

    #[test]
    fn tags_filters_by_range() {
        pyforge()
            .args(["tags", "2.7"])
            .assert()
            .success()
            .stdout(
                predicate::str::contains("2.7.18")
                    .and(predicate::str::contains("3.6.15").not()),
            );
    }

    #[test]
    fn tags_rejects_pypy_range() {
        pyforge()
            .args(["tags", "pypy3.9"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("CPython"));
    }

    #[test]
    fn tags_rejects_garbage_range() {
        pyforge()
            .args(["tags", "not-a-version"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid version"));
    }

    #[test]
    fn install_invalid_version_shows_hint() {
        pyforge()
            .args(["install", "Random string"])
            .assert()
            .failure()
            .stderr(
                predicate::str::contains("Invalid version")
                    .and(predicate::str::contains("Hint:")),
            );
    }

    #[test]
    fn install_without_version_needs_version_file() {
        let temp = tempfile::tempdir().unwrap();
        pyforge()
            .arg("install")
            .current_dir(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains(".python-version"));
    }

    #[test]
    fn install_reads_version_file() {
        // A bogus pinned version fails at parse time, proving the file
        // was read without touching the network
        let temp = tempfile::tempdir().unwrap();
        std::fs::write(temp.path().join(".python-version"), "not a version\n").unwrap();
        pyforge()
            .arg("install")
            .current_dir(temp.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid version"));
    }

    #[test]
    fn install_missing_version_file_is_error() {
        pyforge()
            .args(["install", "--version-file", "/nonexistent/pin.txt"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Path not found"));
    }

    #[test]
    fn resolve_invalid_version() {
        pyforge()
            .args(["resolve", "Random string"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid version"));
    }

    #[test]
    fn config_path() {
        pyforge()
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        pyforge()
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[general]"));
    }

    #[test]
    fn config_verbose_enables_debug_logging() {
        let temp = tempfile::tempdir().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[general]\nverbose = true\n").unwrap();
        pyforge()
            .args(["--config", config.to_str().unwrap(), "resolve", "not-a-version"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("Parsing version string"));
    }

    #[test]
    fn debug_logging_needs_opt_in() {
        let temp = tempfile::tempdir().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "").unwrap();
        pyforge()
            .args(["--config", config.to_str().unwrap(), "resolve", "not-a-version"])
            .assert()
            .failure()
            .stdout(predicate::str::contains("Parsing version string").not());
    }

    #[test]
    fn json_log_format_accepted() {
        let temp = tempfile::tempdir().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[general]\nlog_format = \"json\"\n").unwrap();
        pyforge()
            .args(["--config", config.to_str().unwrap(), "config", "path"])
            .assert()
            .success();
    }

    #[test]
    fn unknown_log_format_rejected() {
        let temp = tempfile::tempdir().unwrap();
        let config = temp.path().join("config.toml");
        std::fs::write(&config, "[general]\nlog_format = \"yaml\"\n").unwrap();
        pyforge()
            .args(["--config", config.to_str().unwrap(), "config", "path"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("unknown log format"));
    }

    #[test]
    fn completions_generate() {
        pyforge()
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("pyforge"));
    }

    #[test]
    fn invalid_build_behavior_rejected() {
        pyforge()
            .args(["install", "3.11", "--build", "maybe"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("invalid build behavior"));
    }
}
