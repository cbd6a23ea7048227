// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::security::SecurityMode;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// A stand-in container engine: a shell script that answers the CLI verbs
/// the adapter uses and emits a canned tool log for `logs`.
fn fake_engine(dir: &Path, log_body: &str, exit_code: i64) -> ContainerEngine {
    let script = dir.join("fake-engine");
    let body = format!(
        "#!/bin/sh\n\
         case \"$1\" in\n\
           image) exit 0 ;;\n\
           create|start|rm|stop|kill|pull) exit 0 ;;\n\
           logs) cat <<'EOF'\n{log_body}\nEOF\n exit 0 ;;\n\
           wait) echo {exit_code} ;;\n\
           *) exit 1 ;;\n\
         esac\n"
    );
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    ContainerEngine::new(script.display().to_string())
}

async fn scratch_repo(dir: &Path) {
    let run = |args: Vec<&'static str>| {
        let dir = dir.to_path_buf();
        async move {
            let mut cmd = tokio::process::Command::new("git");
            cmd.args(&args).current_dir(&dir);
            let output = cmd.output().await.unwrap();
            assert!(output.status.success(), "git {args:?} failed");
        }
    };
    run(vec!["init", "-q"]).await;
    run(vec!["config", "user.email", "t@example.test"]).await;
    run(vec!["config", "user.name", "t"]).await;
    std::fs::write(dir.join("main.py"), "print('x')\n").unwrap();
    run(vec!["add", "."]).await;
    run(vec!["commit", "-q", "-m", "init"]).await;
}

fn orchestrator(tmp: &Path, engine: ContainerEngine) -> TaskOrchestrator {
    TaskOrchestrator::new(
        engine,
        OrchestratorConfig {
            runs_root: tmp.join("runs"),
            image: "tool-runner:latest".to_string(),
            schemas_dir: None,
        },
    )
}

#[test]
fn container_names_are_deterministic() {
    let id = Uuid::new_v4();
    assert_eq!(container_name("codex", id), format!("codex-run-{id}"));
}

#[tokio::test]
async fn dangerous_mode_is_refused_without_confirmation() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = fake_engine(tmp.path(), "", 0);
    let orchestrator = orchestrator(tmp.path(), engine);

    let mut request = RunRequest::new("codex", "task", tmp.path());
    request.security_mode = SecurityMode::FullAccess;

    let err = orchestrator.execute(request, false).await.unwrap_err();
    assert!(matches!(err, RunnerError::SecurityRefused { .. }));
}

#[tokio::test]
async fn marker_run_seals_with_done_and_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    scratch_repo(&repo).await;

    let log = r#"{"type":"message","content":"counting"}
{"type":"command.run","command":"ls","exit_code":0}
{"type":"completion","status":"done","summary":"4 files found","changed_files":[]}
::STATUS::DONE"#;
    let engine = fake_engine(tmp.path(), log, 0);
    let orchestrator = orchestrator(tmp.path(), engine);

    let mut request = RunRequest::new("codex", "count files", &repo);
    request.security_mode = SecurityMode::Readonly;
    let run_id = request.run_id;

    let result = orchestrator.execute(request, false).await.unwrap();
    assert_eq!(result.status, RunStatus::Done);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.summary, "4 files found");
    assert!(result.files_changed.is_empty());
    assert!(result.diff.is_empty());
    assert!(result.error.is_none());

    // Run directory is sealed with every artifact
    let rundir = RunDirectory::open(&tmp.path().join("runs"), run_id).unwrap();
    assert!(rundir.is_sealed());
    assert!(rundir.path(crate::rundir::EVENTS_FILE).exists());
    assert!(rundir.path(crate::rundir::RESPONSE_FILE).exists());
    assert!(rundir.path(crate::rundir::PATCH_FILE).exists());

    let events_text = std::fs::read_to_string(rundir.path(crate::rundir::EVENTS_FILE)).unwrap();
    assert_eq!(events_text.lines().count(), 3);

    let log_text = rundir.read_log().unwrap();
    assert!(log_text.contains("::STATUS::DONE"));
}

#[tokio::test]
async fn secrets_in_tool_output_never_reach_the_log() {
    let tmp = tempfile::tempdir().unwrap();
    let log = r#"{"type":"message","content":"using sk-proj4abcdefghijklmnopqrstuv"}
::STATUS::DONE"#;
    let engine = fake_engine(tmp.path(), log, 0);
    let orchestrator = orchestrator(tmp.path(), engine);

    let request = RunRequest::new("codex", "task", tmp.path().join("nonrepo"));
    let run_id = request.run_id;
    orchestrator.execute(request, false).await.unwrap();

    let rundir = RunDirectory::open(&tmp.path().join("runs"), run_id).unwrap();
    let log_text = rundir.read_log().unwrap();
    assert!(!log_text.contains("sk-proj4"), "{log_text}");
    assert!(log_text.contains("[REDACTED]"));
}

#[tokio::test]
async fn schema_violation_lowers_status_to_error() {
    let tmp = tempfile::tempdir().unwrap();
    // Completion payload is missing the required summary
    let log = r#"{"type":"completion","status":"done","changed_files":["a.py"]}
::STATUS::DONE"#;
    let engine = fake_engine(tmp.path(), log, 0);
    let orchestrator = orchestrator(tmp.path(), engine);

    let mut request = RunRequest::new("codex", "task", tmp.path().join("nonrepo"));
    request.output_schema = Some("default".to_string());

    let result = orchestrator.execute(request, false).await.unwrap();
    assert_eq!(result.status, RunStatus::Error);
    let error = result.error.unwrap();
    assert!(error.contains("root"), "{error}");
    assert!(error.contains("summary"), "{error}");
}

#[tokio::test]
async fn clean_exit_without_marker_is_success() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = fake_engine(tmp.path(), "plain output only", 0);
    let orchestrator = orchestrator(tmp.path(), engine);

    let request = RunRequest::new("codex", "task", tmp.path().join("nonrepo"));
    let result = orchestrator.execute(request, false).await.unwrap();
    assert_eq!(result.status, RunStatus::Success);
}

#[tokio::test]
async fn nonzero_exit_without_marker_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = fake_engine(tmp.path(), "boom", 3);
    let orchestrator = orchestrator(tmp.path(), engine);

    let request = RunRequest::new("codex", "task", tmp.path().join("nonrepo"));
    let result = orchestrator.execute(request, false).await.unwrap();
    assert_eq!(result.status, RunStatus::Error);
    assert_eq!(result.exit_code, Some(3));
    assert!(result.error.unwrap().contains("code 3"));
}

#[tokio::test]
async fn marker_overrides_exit_code() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = fake_engine(tmp.path(), "::STATUS::NEED_USER", 0);
    let orchestrator = orchestrator(tmp.path(), engine);

    let request = RunRequest::new("codex", "task", tmp.path().join("nonrepo"));
    let result = orchestrator.execute(request, false).await.unwrap();
    assert_eq!(result.status, RunStatus::NeedUser);
}

#[tokio::test]
async fn workspace_changes_are_captured_in_the_patch() {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    scratch_repo(&repo).await;
    // Simulate the tool having modified the workspace
    std::fs::write(repo.join("main.py"), "print('changed')\n").unwrap();

    let engine = fake_engine(tmp.path(), "::STATUS::DONE", 0);
    let orchestrator = orchestrator(tmp.path(), engine);

    let request = RunRequest::new("codex", "edit", &repo);
    let result = orchestrator.execute(request, false).await.unwrap();

    assert_eq!(result.files_changed, vec!["main.py"]);
    assert!(result.diff.contains("+print('changed')"));
}

#[tokio::test]
async fn cancel_stops_and_writes_the_status_marker() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = fake_engine(tmp.path(), "::STATUS::DONE", 0);
    let orchestrator = orchestrator(tmp.path(), engine);

    let request = RunRequest::new("codex", "task", tmp.path().join("nonrepo"));
    let run_id = request.run_id;
    orchestrator.execute(request, false).await.unwrap();

    orchestrator.cancel("codex", run_id).await.unwrap();
    let rundir = RunDirectory::open(&tmp.path().join("runs"), run_id).unwrap();
    let status = std::fs::read_to_string(rundir.path(crate::rundir::STATUS_FILE)).unwrap();
    assert!(status.contains("cancelled"));
}

#[tokio::test]
async fn cancel_of_an_unknown_run_is_an_error() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = fake_engine(tmp.path(), "", 0);
    let orchestrator = orchestrator(tmp.path(), engine);
    assert!(matches!(
        orchestrator.cancel("codex", Uuid::new_v4()).await.unwrap_err(),
        RunnerError::RunNotFound { .. }
    ));
}
