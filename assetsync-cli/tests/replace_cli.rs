use std::process::Command;

use assert_cmd::prelude::*;
use assert_fs::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;

fn assetsync_cmd() -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("assetsync"));
    cmd.env_remove("RUST_LOG").env("NO_COLOR", "1");
    cmd
}

fn theme(root: &assert_fs::TempDir) {
    root.child("layout/theme.liquid").write_str("<html>").unwrap();
    root.child("assets/app.js").write_str("run()").unwrap();
}

#[test]
fn full_replace_converges_remote_directory() {
    let work = assert_fs::TempDir::new().unwrap();
    let store = assert_fs::TempDir::new().unwrap();
    theme(&work);
    store.child("assets/stale.css").write_str("old").unwrap();

    assetsync_cmd()
        .arg("replace")
        .arg("--root")
        .arg(work.path())
        .arg("--remote")
        .arg(store.path())
        .assert()
        .success()
        .stdout(contains("layout/theme.liquid"))
        .stdout(contains("assets/stale.css"))
        .stdout(contains("3 changed"));

    store.child("layout/theme.liquid").assert("<html>");
    store.child("assets/app.js").assert("run()");
    store.child("assets/stale.css").assert(predicate::path::missing());

    assetsync_cmd()
        .arg("replace")
        .arg("--root")
        .arg(work.path())
        .arg("--remote")
        .arg(store.path())
        .assert()
        .success()
        .stdout(contains("0 changed, 2 unchanged"));
}

#[test]
fn remote_from_config_file_and_nested_store_is_not_uploaded() {
    let work = assert_fs::TempDir::new().unwrap();
    theme(&work);
    work.child("assetsync.yaml")
        .write_str("remote: published\nrate_limit:\n  capacity: 10\n  drain_per_second: 50.0\n")
        .unwrap();

    assetsync_cmd()
        .arg("replace")
        .arg("--root")
        .arg(work.path())
        .assert()
        .success();

    work.child("published/layout/theme.liquid").assert("<html>");
    work.child("published/assetsync.yaml").assert(predicate::path::missing());
    work.child("published/published").assert(predicate::path::missing());
}

#[test]
fn explicit_files_skip_missing_by_default_and_fail_with_abort() {
    let work = assert_fs::TempDir::new().unwrap();
    let store = assert_fs::TempDir::new().unwrap();
    theme(&work);

    assetsync_cmd()
        .args(["replace", "assets/app.js", "missing.css"])
        .arg("--root")
        .arg(work.path())
        .arg("--remote")
        .arg(store.path())
        .assert()
        .success()
        .stdout(contains("1 skipped"));
    store.child("assets/app.js").assert("run()");
    store.child("layout/theme.liquid").assert(predicate::path::missing());

    assetsync_cmd()
        .args(["replace", "missing.css", "layout/theme.liquid"])
        .arg("--root")
        .arg(work.path())
        .arg("--remote")
        .arg(store.path())
        .args(["--on-load-failure", "abort"])
        .assert()
        .failure()
        .stderr(contains("missing.css"));
    store.child("layout/theme.liquid").assert(predicate::path::missing());
}

#[test]
fn dry_run_prints_plan_and_writes_nothing() {
    let work = assert_fs::TempDir::new().unwrap();
    let store = assert_fs::TempDir::new().unwrap();
    theme(&work);
    store.child("old.txt").write_str("old").unwrap();

    assetsync_cmd()
        .arg("replace")
        .arg("--root")
        .arg(work.path())
        .arg("--remote")
        .arg(store.path())
        .arg("--dry-run")
        .assert()
        .success()
        .stdout(contains("[dry-run] 3 change(s) planned"))
        .stdout(contains("removal"))
        .stdout(contains("old.txt"));

    store.child("old.txt").assert("old");
    store.child("assets/app.js").assert(predicate::path::missing());
}

#[test]
fn json_output_is_one_entry_per_line() {
    let work = assert_fs::TempDir::new().unwrap();
    let store = assert_fs::TempDir::new().unwrap();
    theme(&work);

    let output = assetsync_cmd()
        .arg("replace")
        .arg("--root")
        .arg(work.path())
        .arg("--remote")
        .arg(store.path())
        .arg("--json")
        .output()
        .expect("run assetsync");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).expect("utf8");
    let mut keys: Vec<String> = stdout
        .lines()
        .map(|line| {
            let value: serde_json::Value = serde_json::from_str(line).expect("json line");
            assert_eq!(value["status"], "succeeded");
            assert_eq!(value["action"], "upload");
            value["key"].as_str().expect("key").to_string()
        })
        .collect();
    keys.sort();
    assert_eq!(keys, vec!["assets/app.js", "layout/theme.liquid"]);
}

#[test]
fn invalid_rate_limit_fails_before_touching_remote() {
    let work = assert_fs::TempDir::new().unwrap();
    let store = assert_fs::TempDir::new().unwrap();
    theme(&work);

    assetsync_cmd()
        .arg("replace")
        .arg("--root")
        .arg(work.path())
        .arg("--remote")
        .arg(store.path())
        .args(["--rate-capacity", "0", "--rate-drain", "1"])
        .assert()
        .failure()
        .stderr(contains("invalid rate limit"));

    store.child("assets/app.js").assert(predicate::path::missing());
}

#[test]
fn remote_equal_to_root_is_rejected_and_nothing_is_removed() {
    let work = assert_fs::TempDir::new().unwrap();
    theme(&work);

    assetsync_cmd()
        .current_dir(work.path())
        .args(["replace", "--remote", "."])
        .assert()
        .failure()
        .stderr(contains("must not be the working root"));

    work.child("layout/theme.liquid").assert("<html>");
    work.child("assets/app.js").assert("run()");
}

#[test]
fn remote_above_root_is_rejected_and_nothing_is_removed() {
    let parent = assert_fs::TempDir::new().unwrap();
    parent.child("work/a.txt").write_str("a").unwrap();
    parent.child("keep.txt").write_str("keep").unwrap();

    assetsync_cmd()
        .arg("replace")
        .arg("--root")
        .arg(parent.child("work").path())
        .arg("--remote")
        .arg(parent.path())
        .assert()
        .failure()
        .stderr(contains("must not be the working root"));

    parent.child("work/a.txt").assert("a");
    parent.child("keep.txt").assert("keep");

    assetsync_cmd()
        .arg("replace")
        .arg("--root")
        .arg(parent.child("work").path())
        .arg("--remote")
        .arg(parent.path())
        .arg("--dry-run")
        .assert()
        .failure()
        .stderr(contains("must not be the working root"));
}

#[test]
fn missing_remote_is_reported() {
    let work = assert_fs::TempDir::new().unwrap();
    theme(&work);

    assetsync_cmd()
        .arg("replace")
        .arg("--root")
        .arg(work.path())
        .assert()
        .failure()
        .stderr(contains("no remote store configured"));
}
