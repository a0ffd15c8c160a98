use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

const BIN: &str = env!("CARGO_BIN_EXE_tooltree");

fn write(root: &Path, relative: &str, contents: &str) -> PathBuf {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).expect("failed to create parent dir");
    fs::write(&path, contents).expect("failed to write file");
    path
}

/// A project with a `.tooltree` directory:
///
/// - `build` (runnable, `--release`, `--target=T` from a fixed set)
/// - `db migrate` (runnable, optional `version`), `db seed` (description only)
/// - `_doctor` (hidden, runnable)
fn project() -> TempDir {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let root = dir.path();
    write(root, ".tooltree/.tooltree.yml", "desc: Project tools\n");
    write(
        root,
        ".tooltree/build.yml",
        r#"
desc: Build the project
flags:
  - key: release
    syntax: --release
  - key: target
    syntax: --target=T
    accept:
      enum: [x86, arm]
exec: ["sh", "-c", "exit 0"]
"#,
    );
    write(
        root,
        ".tooltree/db/migrate.yml",
        r#"
desc: Run migrations
args:
  - key: version
    arity: optional
    default: latest
exec: ["sh", "-c", "exit 0"]
"#,
    );
    write(root, ".tooltree/db/seed.yml", "desc: Seed data\n");
    write(root, ".tooltree/_doctor.yml", "exec: [\"sh\", \"-c\", \"exit 0\"]\n");
    dir
}

fn tooltree(project: &TempDir, args: &[&str]) -> Output {
    let tools = project.path().join(".tooltree");
    Command::new(BIN)
        .arg("--tools")
        .arg(&tools)
        .args(args)
        .env_remove("TOOLTREE_LOG")
        .output()
        .expect("failed to run tooltree")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({e}): {}\nstderr: {}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

// ---------------------------------------------------------------------------
// resolve / list
// ---------------------------------------------------------------------------

#[test]
fn resolve_prints_tool_and_remaining_args() {
    let dir = project();
    let output = tooltree(&dir, &["resolve", "db", "migrate", "v3", "--dry-run"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["tool"]["words"], serde_json::json!(["db", "migrate"]));
    assert_eq!(json["tool"]["desc"], "Run migrations");
    assert_eq!(json["tool"]["runnable"], true);
    assert_eq!(json["args"], serde_json::json!(["v3", "--dry-run"]));
}

#[test]
fn resolve_unknown_words_falls_back_to_root() {
    let dir = project();
    let output = tooltree(&dir, &["resolve", "nope"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["tool"]["words"], serde_json::json!([]));
    assert_eq!(json["tool"]["desc"], "Project tools");
    assert_eq!(json["args"], serde_json::json!(["nope"]));
}

#[test]
fn list_hides_hidden_and_non_runnable_tools() {
    let dir = project();
    let output = tooltree(&dir, &["list", "--recursive"]);
    assert!(output.status.success());
    let json = stdout_json(&output);
    let names: Vec<String> = json
        .as_array()
        .unwrap()
        .iter()
        .map(|entry| {
            let words: Vec<&str> = entry["words"]
                .as_array()
                .unwrap()
                .iter()
                .map(|w| w.as_str().unwrap())
                .collect();
            words.join(" ")
        })
        .collect();
    assert_eq!(names, vec!["build", "db", "db migrate"]);

    let output = tooltree(&dir, &["list", "--all", "db"]);
    let json = stdout_json(&output);
    let entries = json.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "tool");
    assert_eq!(entries[1]["words"], serde_json::json!(["db", "seed"]));
}

// ---------------------------------------------------------------------------
// parse / complete
// ---------------------------------------------------------------------------

#[test]
fn parse_binds_flags_and_defaults() {
    let dir = project();
    let output = tooltree(&dir, &["parse", "build", "--rel", "--target=arm"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let json = stdout_json(&output);
    assert_eq!(json["data"]["release"], true);
    assert_eq!(json["data"]["target"], "arm");
    assert!(json["errors"].as_array().unwrap().is_empty());

    let output = tooltree(&dir, &["parse", "db", "migrate"]);
    let json = stdout_json(&output);
    assert_eq!(json["data"]["version"], "latest");
}

#[test]
fn parse_usage_errors_exit_with_status_two() {
    let dir = project();
    let output = tooltree(&dir, &["parse", "build", "--relase", "--target=mips"]);
    assert_eq!(output.status.code(), Some(2));
    let json = stdout_json(&output);
    let errors = json["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0]["kind"], "flag_unrecognized");
    assert_eq!(errors[0]["suggestions"], serde_json::json!(["--release"]));
    assert_eq!(errors[1]["kind"], "flag_value_not_accepted");
}

#[test]
fn complete_offers_subtools_flags_and_values() {
    let dir = project();
    let strings = |output: &Output| -> Vec<String> {
        stdout_json(output)
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["string"].as_str().unwrap().to_string())
            .collect()
    };

    assert_eq!(strings(&tooltree(&dir, &["complete", "b"])), vec!["build"]);
    assert_eq!(strings(&tooltree(&dir, &["complete", "db", ""])), vec!["migrate"]);
    assert_eq!(strings(&tooltree(&dir, &["complete", "build", "--t"])), vec!["--target"]);
    assert_eq!(
        strings(&tooltree(&dir, &["complete", "build", "--target=a"])),
        vec!["--target=arm"]
    );
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[test]
fn run_propagates_exit_status() {
    let dir = project();
    write(dir.path(), ".tooltree/fail.yml", "exec: [\"sh\", \"-c\", \"exit 3\"]\n");
    let output = tooltree(&dir, &["run", "fail"]);
    assert_eq!(output.status.code(), Some(3));

    let output = tooltree(&dir, &["run", "build", "--release"]);
    assert!(output.status.success());
}

#[cfg(unix)]
#[test]
fn run_exports_bound_data_to_the_command() {
    let dir = project();
    write(
        dir.path(),
        ".tooltree/greet.yml",
        r#"
flags:
  - key: name
    syntax: --name=NAME
    default: nobody
exec: ["sh", "-c", "printf '%s in %s' \"$TOOLTREE_NAME\" \"$(basename \"$(pwd -P)\")\""]
"#,
    );
    let output = tooltree(&dir, &["run", "greet", "--name=Ada"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let project_name = dir.path().file_name().unwrap().to_string_lossy().to_string();
    assert_eq!(
        String::from_utf8_lossy(&output.stdout),
        format!("Ada in {project_name}")
    );
}

#[test]
fn run_reports_usage_errors() {
    let dir = project();
    let output = tooltree(&dir, &["run", "db", "migrate", "v1", "extra"]);
    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("extra arguments: extra"), "stderr: {stderr}");
}

#[test]
fn run_namespace_fails() {
    let dir = project();
    let output = tooltree(&dir, &["run", "db"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("has nothing to run"), "stderr: {stderr}");
}

// ---------------------------------------------------------------------------
// sources and configuration
// ---------------------------------------------------------------------------

#[test]
fn discovers_tool_directories_from_working_directory() {
    let dir = project();
    let nested = dir.path().join("src/deep");
    fs::create_dir_all(&nested).unwrap();
    let output = Command::new(BIN)
        .args(["resolve", "build"])
        .current_dir(&nested)
        .output()
        .expect("failed to run tooltree");
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["tool"]["words"], serde_json::json!(["build"]));
}

#[test]
fn earlier_tool_paths_take_precedence() {
    let dir = project();
    let overlay = write(dir.path(), "overlay/build.yml", "desc: Overlay build\nexec: [\"true\"]\n");
    let output = Command::new(BIN)
        .arg("--tools")
        .arg(overlay.parent().unwrap())
        .arg("--tools")
        .arg(dir.path().join(".tooltree"))
        .args(["resolve", "build"])
        .output()
        .expect("failed to run tooltree");
    let json = stdout_json(&output);
    assert_eq!(json["tool"]["desc"], "Overlay build");
    assert_eq!(json["tool"]["priority"], -1);
}

#[test]
fn config_file_sets_word_delimiters() {
    let dir = project();
    let config = write(dir.path(), "tooltree-config.yml", "extra_delimiters: \":\"\n");
    let output = Command::new(BIN)
        .arg("--config")
        .arg(&config)
        .arg("--tools")
        .arg(dir.path().join(".tooltree"))
        .args(["resolve", "db:migrate"])
        .output()
        .expect("failed to run tooltree");
    assert!(output.status.success());
    let json = stdout_json(&output);
    assert_eq!(json["tool"]["words"], serde_json::json!(["db", "migrate"]));
}

#[test]
fn invalid_config_file_is_an_error() {
    let dir = project();
    let config = write(dir.path(), "bad-config.yml", "no_such_setting: 1\n");
    let output = Command::new(BIN)
        .arg("--config")
        .arg(&config)
        .args(["resolve"])
        .output()
        .expect("failed to run tooltree");
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).starts_with("error:"));
}

#[test]
fn broken_tool_file_only_affects_its_own_lookups() {
    let dir = project();
    write(dir.path(), ".tooltree/broken.yml", "flags: [{key: x, syntax: \"-\"}]\n");
    let output = tooltree(&dir, &["resolve", "build"]);
    assert!(output.status.success());

    let output = tooltree(&dir, &["resolve", "broken"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("broken.yml"), "stderr: {stderr}");
}

#[cfg(unix)]
fn git(dir: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(["-c", "user.name=tooltree", "-c", "user.email=tooltree@example.com"])
        .args(["-c", "commit.gpgsign=false"])
        .args(args)
        .current_dir(dir)
        .stdout(std::process::Stdio::null())
        .status()
        .expect("failed to run git");
    assert!(status.success(), "git {args:?} failed");
}

#[cfg(unix)]
#[test]
fn update_flag_refreshes_cached_git_sources() {
    if Command::new("git").arg("--version").output().is_err() {
        return;
    }
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let repo = dir.path().join("repo");
    let commit = |desc: &str| {
        write(&repo, "tools/build.yml", &format!("desc: {desc}\nexec: [\"true\"]\n"));
        git(&repo, &["add", "-A"]);
        git(&repo, &["commit", "-q", "-m", desc]);
    };
    fs::create_dir_all(&repo).unwrap();
    git(&repo, &["init", "-q"]);
    git(&repo, &["symbolic-ref", "HEAD", "refs/heads/main"]);
    commit("First build");

    let desc = |update: bool| {
        let mut command = Command::new(BIN);
        command
            .arg("--git")
            .arg(&repo)
            .args(["tools", "main"])
            .arg("--git-cache")
            .arg(dir.path().join("cache"))
            .current_dir(dir.path());
        if update {
            command.arg("--update");
        }
        let output = command.args(["resolve", "build"]).output().expect("failed to run tooltree");
        assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
        stdout_json(&output)["tool"]["desc"].as_str().unwrap().to_string()
    };

    assert_eq!(desc(false), "First build");
    commit("Second build");
    assert_eq!(desc(false), "First build");
    assert_eq!(desc(true), "Second build");
}
