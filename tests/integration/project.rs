//! Project file integration tests.
//!
//! Tests that load a complete project from YAML and run it against a real
//! directory tree.

use crate::common::{read_file, write_file};
use brisk::{
    ConfigError, Orchestrator, RunError, TaskError, TaskId, load_project, resolve,
};
use std::path::Path;
use tempfile::TempDir;

const SITE_PROJECT: &str = r#"
name: h5bp
version: "5.0.0"
license: MIT
homepage: https://html5boilerplate.com
directories:
  src: src
  dist: dist
  archive: archive
vars:
  jquery_version: "1.11.2"
default: build
max_concurrency: 4

tasks:
  - id: clean
    description: Remove {{dirs.dist}} and {{dirs.archive}}
    type: clean
    paths: ["{{dirs.dist}}", "{{dirs.archive}}"]

  - id: "lint:js"
    type: shell
    script: test -f {{dirs.src}}/js/main.js

  - id: "copy:index.html"
    type: copy
    sources: ["{{dirs.src}}/index.html"]
    dest: "{{dirs.dist}}"
    replace:
      - from: "{{JQUERY_VERSION}}"
        to: "{{vars.jquery_version}}"

  - id: "copy:jquery"
    type: copy
    sources: ["{{dirs.src}}/vendor/jquery.min.js"]
    dest: "{{dirs.dist}}/js/vendor"
    rename: "jquery-{{vars.jquery_version}}.min.js"

  - id: "copy:main.css"
    type: copy
    sources: ["{{dirs.src}}/css/main.css"]
    dest: "{{dirs.dist}}/css"
    header: "/*! {{name}} v{{version}} | {{license}} License | {{homepage}} */\n"

  - id: "copy:misc"
    type: copy
    dest: "{{dirs.dist}}"
    dot: true
    sources:
      - "{{dirs.src}}/**/*"
      - "!{{dirs.src}}/css/main.css"
      - "!{{dirs.src}}/index.html"
      - "!{{dirs.src}}/vendor/**"

  - id: copy
    type: alias
    depends_on: ["copy:index.html", "copy:jquery", "copy:main.css", "copy:misc"]

  - id: build
    description: Build {{name}} into {{dirs.dist}}
    type: sequence
    steps:
      - [clean, "lint:js"]
      - copy

  - id: "archive:create_archive_dir"
    type: mkdir
    path: "{{dirs.archive}}"

  - id: "archive:zip"
    type: shell
    depends_on: ["archive:create_archive_dir"]
    script: tar -cf {{dirs.archive}}/{{name}}_v{{version}}.tar -C {{dirs.dist}} .

  - id: archive
    type: sequence
    steps:
      - build
      - "archive:zip"

watch:
  - paths: ["{{dirs.src}}/**/*.css"]
    tasks: ["copy:main.css"]
"#;

fn site() -> TempDir {
    populate(TempDir::new().unwrap())
}

fn populate(dir: TempDir) -> TempDir {
    let root = dir.path();
    write_file(root, "src/index.html", r#"<script src="js/vendor/jquery-{{JQUERY_VERSION}}.min.js"></script>"#);
    write_file(root, "src/css/main.css", "body { margin: 0; }\n");
    write_file(root, "src/js/main.js", "console.log('hi');\n");
    write_file(root, "src/js/plugins.js", "// plugins\n");
    write_file(root, "src/vendor/jquery.min.js", "/* jquery */\n");
    write_file(root, "src/.htaccess", "Options -Indexes\n");
    write_file(root, "src/robots.txt", "User-agent: *\n");
    write_file(root, "brisk.yaml", SITE_PROJECT);
    dir
}

async fn run(root: &Path, task: Option<&str>) -> Result<brisk::RunReport, RunError> {
    let project = load_project(root.join("brisk.yaml")).unwrap();
    let mut orchestrator = Orchestrator::new(project.registry);
    if let Some(max) = project.max_concurrency {
        orchestrator = orchestrator.with_concurrency(max);
    }
    match task {
        Some(task) => orchestrator.run(task).await,
        None => orchestrator.run_default().await,
    }
}

/// Test: the default build produces the distribution tree.
#[tokio::test]
async fn test_default_build_produces_dist() {
    let dir = site();
    let root = dir.path();
    write_file(root, "dist/stale.txt", "left over");

    let report = run(root, None).await.unwrap();
    assert!(report.success);

    assert!(!root.join("dist/stale.txt").exists());
    assert_eq!(
        read_file(root, "dist/index.html"),
        r#"<script src="js/vendor/jquery-1.11.2.min.js"></script>"#
    );
    assert_eq!(read_file(root, "dist/js/vendor/jquery-1.11.2.min.js"), "/* jquery */\n");
    assert_eq!(
        read_file(root, "dist/css/main.css"),
        "/*! h5bp v5.0.0 | MIT License | https://html5boilerplate.com */\nbody { margin: 0; }\n"
    );

    // copy:misc keeps paths below the glob base and honours exclusions
    assert_eq!(read_file(root, "dist/js/main.js"), "console.log('hi');\n");
    assert_eq!(read_file(root, "dist/robots.txt"), "User-agent: *\n");
    assert_eq!(read_file(root, "dist/.htaccess"), "Options -Indexes\n");
    assert!(!root.join("dist/vendor").exists());
}

/// Test: a project loaded through a relative path keeps the copied tree intact.
#[tokio::test]
async fn test_build_from_relative_project_path() {
    let dir = populate(TempDir::new_in(".").unwrap());
    let relative = Path::new(".").join(dir.path().file_name().unwrap());

    let project = load_project(relative.join("brisk.yaml")).unwrap();
    assert_eq!(project.manifest.root, relative);
    Orchestrator::new(project.registry).run("build").await.unwrap();

    let root = dir.path();
    assert_eq!(
        read_file(root, "dist/index.html"),
        r#"<script src="js/vendor/jquery-1.11.2.min.js"></script>"#
    );
    assert_eq!(read_file(root, "dist/js/main.js"), "console.log('hi');\n");
    assert_eq!(read_file(root, "dist/.htaccess"), "Options -Indexes\n");
    assert!(root.join("dist/css/main.css").is_file());
    assert!(!root.join("dist/main.js").exists());
    assert!(!root.join("dist/main.css").exists());
    assert!(!root.join("dist/vendor").exists());
}

/// Test: archive runs the build first, then packs it.
#[tokio::test]
async fn test_archive_after_build() {
    let dir = site();
    let root = dir.path();

    let report = run(root, Some("archive")).await.unwrap();

    assert!(report.success);
    assert!(root.join("archive/h5bp_v5.0.0.tar").is_file());
    assert!(report.completed.contains(&TaskId::new("build")));
    let build = report.completed.iter().position(|t| t.as_str() == "build");
    let zip = report.completed.iter().position(|t| t.as_str() == "archive:zip");
    assert!(build < zip);
}

/// Test: a failing command stops the build and names the task.
#[tokio::test]
async fn test_failing_command_fails_build() {
    let dir = site();
    let root = dir.path();
    std::fs::remove_file(root.join("src/js/main.js")).unwrap();

    let err = run(root, None).await.unwrap_err();

    assert_eq!(err.task(), Some(&TaskId::new("lint:js")));
    match err {
        RunError::ActionFailed { source, .. } => {
            assert!(matches!(*source, TaskError::CommandFailed { code: 1, .. }));
        }
        other => panic!("Expected ActionFailed, got {:?}", other),
    }
    // clean ran alongside lint; copy never started
    assert!(!root.join("dist/index.html").exists());
}

/// Test: the loaded registry carries descriptions, the default task and watch rules.
#[test]
fn test_loaded_registry() {
    let dir = site();
    let project = load_project(dir.path().join("brisk.yaml")).unwrap();

    assert_eq!(project.manifest.name, "h5bp");
    assert_eq!(project.manifest.root, dir.path());
    assert_eq!(project.registry.default_task(), Some(&TaskId::new("build")));
    assert_eq!(project.max_concurrency, Some(4));

    let build = project.registry.get(&TaskId::new("build")).unwrap();
    assert_eq!(build.description.as_deref(), Some("Build h5bp into dist"));
    assert_eq!(build.action.kind(), "sequence");
    assert_eq!(
        build.action.describe().as_deref(),
        Some("[clean, lint:js] -> copy")
    );

    let clean = project.registry.get(&TaskId::new("clean")).unwrap();
    assert_eq!(clean.description.as_deref(), Some("Remove dist and archive"));

    assert_eq!(project.watch.len(), 1);
    assert!(project.watch[0].matches(Path::new("src/css/main.css")));
    assert_eq!(project.watch[0].tasks(), &[TaskId::new("copy:main.css")]);
}

/// Test: every task in the project resolves.
#[test]
fn test_project_validates() {
    let dir = site();
    let project = load_project(dir.path().join("brisk.yaml")).unwrap();

    let all = project.registry.task_ids().to_vec();
    let plan = resolve(&project.registry, &all).unwrap();

    assert_eq!(plan.len(), all.len());
}

/// Test: an unknown dependency loads but fails validation.
#[test]
fn test_unknown_dependency_fails_validation() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "brisk.yaml",
        r#"
name: broken
tasks:
  - id: build
    type: alias
    depends_on: [compile]
"#,
    );

    let project = load_project(dir.path().join("brisk.yaml")).unwrap();
    let err = resolve(&project.registry, project.registry.task_ids()).unwrap_err();

    assert_eq!(err.to_string(), "unknown task 'compile' (required by 'build')");
}

/// Test: a placeholder with no value is a load error.
#[test]
fn test_unknown_placeholder_fails_load() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "brisk.yaml",
        r#"
name: broken
tasks:
  - id: clean
    type: clean
    paths: ["{{dirs.dist}}"]
"#,
    );

    let err = load_project(dir.path().join("brisk.yaml")).unwrap_err();

    assert!(matches!(
        err,
        ConfigError::UnknownPlaceholder { ref placeholder, .. } if placeholder == "dirs.dist"
    ));
}

/// Test: a duplicate task name is a load error.
#[test]
fn test_duplicate_task_fails_load() {
    let dir = TempDir::new().unwrap();
    write_file(
        dir.path(),
        "brisk.yaml",
        r#"
name: broken
tasks:
  - id: clean
    type: alias
  - id: clean
    type: alias
"#,
    );

    let err = load_project(dir.path().join("brisk.yaml")).unwrap_err();

    assert!(err.to_string().contains("clean"));
}
