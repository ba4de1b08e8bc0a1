//! Integration tests for imggate

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn imggate() -> Command {
        cargo_bin_cmd!("imggate")
    }

    /// Point the binary at a config path that does not exist so tests
    /// never read a developer's real configuration.
    fn with_empty_config(cmd: &mut Command, temp: &TempDir) {
        cmd.arg("--config")
            .arg(temp.path().join("missing-config.toml"));
    }

    #[test]
    fn help_displays() {
        imggate()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Authenticated caching gateway"));
    }

    #[test]
    fn version_displays() {
        imggate()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("imggate"));
    }

    #[test]
    fn config_path_displays() {
        let temp = TempDir::new().unwrap();
        let mut cmd = imggate();
        with_empty_config(&mut cmd, &temp);
        cmd.args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("missing-config.toml"));
    }

    #[test]
    fn config_show_prints_defaults() {
        let temp = TempDir::new().unwrap();
        let mut cmd = imggate();
        with_empty_config(&mut cmd, &temp);
        cmd.args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[server]"))
            .stdout(predicate::str::contains("[backend]"));
    }

    #[test]
    fn config_init_writes_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        imggate()
            .arg("--config")
            .arg(&path)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Wrote default config"));

        assert!(path.exists());
    }

    #[test]
    fn serve_refuses_without_secret() {
        let temp = TempDir::new().unwrap();
        let mut cmd = imggate();
        with_empty_config(&mut cmd, &temp);
        cmd.arg("serve")
            .assert()
            .failure()
            .stderr(predicate::str::contains("secret is not configured"));
    }

    #[test]
    fn import_missing_file_fails() {
        let temp = TempDir::new().unwrap();
        let mut cmd = imggate();
        with_empty_config(&mut cmd, &temp);
        cmd.arg("import")
            .arg(temp.path().join("absent.txt"))
            .assert()
            .failure()
            .stderr(predicate::str::contains("reading import list"));
    }

    #[test]
    fn import_requires_file_argument() {
        imggate().arg("import").assert().failure();
    }
}
