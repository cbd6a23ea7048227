// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Patch-based change review
//!
//! Changes a tool made to a workspace become a unified diff (`git diff`
//! against HEAD plus zero-context pseudo-diffs for untracked files) that
//! can be previewed, applied with explicit approval, and reverted.

use crate::error::RunnerError;
use herd_adapters::subprocess::{run_with_timeout, GIT_APPLY_TIMEOUT, GIT_QUERY_TIMEOUT};
use std::path::Path;
use tokio::process::Command;
use tracing::info;

/// What applying a patch would do.
#[derive(Debug, Clone, Default)]
pub struct PatchPreview {
    pub summary: String,
    pub files_affected: Vec<String>,
    pub insertions: u32,
    pub deletions: u32,
    pub can_apply: bool,
    pub apply_errors: Option<String>,
}

fn git(workspace: &Path, args: &[&str]) -> Command {
    let mut cmd = Command::new("git");
    cmd.args(args).current_dir(workspace);
    cmd
}

async fn git_query(workspace: &Path, args: &[&str], what: &str) -> Result<String, RunnerError> {
    let output = run_with_timeout(git(workspace, args), GIT_QUERY_TIMEOUT, what)
        .await
        .map_err(|message| RunnerError::Git { message })?;
    if !output.status.success() {
        return Err(RunnerError::Git {
            message: format!(
                "{what} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Unified diff of the workspace against HEAD, optionally with
/// zero-context entries for untracked files.
pub async fn generate_patch(
    workspace: &Path,
    include_untracked: bool,
) -> Result<String, RunnerError> {
    let mut patch = git_query(workspace, &["diff", "--no-color", "HEAD"], "git diff").await?;

    if include_untracked {
        let untracked = git_query(
            workspace,
            &["ls-files", "--others", "--exclude-standard"],
            "git ls-files",
        )
        .await?;

        for file in untracked.lines().filter(|l| !l.is_empty()) {
            let path = workspace.join(file);
            if !path.is_file() {
                continue;
            }
            let Ok(content) = std::fs::read_to_string(&path) else {
                continue;
            };
            let lines: Vec<&str> = content.lines().collect();
            patch.push_str(&format!("--- /dev/null\n+++ b/{file}\n"));
            patch.push_str(&format!("@@ -0,0 +1,{} @@\n", lines.len()));
            for line in lines {
                patch.push('+');
                patch.push_str(line);
                patch.push('\n');
            }
        }
    }

    Ok(patch)
}

/// Files modified relative to HEAD plus untracked files, sorted.
pub async fn changed_files(workspace: &Path) -> Result<Vec<String>, RunnerError> {
    let tracked = git_query(
        workspace,
        &["diff", "--name-only", "HEAD"],
        "git diff --name-only",
    )
    .await?;
    let untracked = git_query(
        workspace,
        &["ls-files", "--others", "--exclude-standard"],
        "git ls-files",
    )
    .await?;

    let mut files: Vec<String> = tracked
        .lines()
        .chain(untracked.lines())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect();
    files.sort();
    files.dedup();
    Ok(files)
}

/// Preview a patch: `--stat` plus a `--check` dry run.
pub async fn preview_patch(patch_path: &Path, workspace: &Path) -> Result<PatchPreview, RunnerError> {
    let patch_str = patch_path.display().to_string();

    let stat = run_with_timeout(
        git(workspace, &["apply", "--stat", &patch_str]),
        GIT_QUERY_TIMEOUT,
        "git apply --stat",
    )
    .await
    .map_err(|message| RunnerError::Git { message })?;

    let check = run_with_timeout(
        git(workspace, &["apply", "--check", &patch_str]),
        GIT_QUERY_TIMEOUT,
        "git apply --check",
    )
    .await
    .map_err(|message| RunnerError::Git { message })?;

    let summary = String::from_utf8_lossy(&stat.stdout).trim().to_string();
    let (files_affected, insertions, deletions) = parse_stat_output(&summary);
    let can_apply = check.status.success();

    Ok(PatchPreview {
        summary,
        files_affected,
        insertions,
        deletions,
        can_apply,
        apply_errors: if can_apply {
            None
        } else {
            Some(String::from_utf8_lossy(&check.stderr).trim().to_string())
        },
    })
}

/// Apply a patch. Refused outright without `user_approved`.
pub async fn apply_patch(
    patch_path: &Path,
    workspace: &Path,
    user_approved: bool,
) -> Result<(), RunnerError> {
    if !user_approved {
        return Err(RunnerError::SecurityRefused {
            message: "patch application requires user approval".to_string(),
        });
    }

    let patch_str = patch_path.display().to_string();
    let output = run_with_timeout(
        git(workspace, &["apply", &patch_str]),
        GIT_APPLY_TIMEOUT,
        "git apply",
    )
    .await
    .map_err(|message| RunnerError::Git { message })?;

    if !output.status.success() {
        return Err(RunnerError::Git {
            message: format!(
                "apply failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    info!(patch = %patch_path.display(), "patch applied");
    Ok(())
}

/// Apply a patch in reverse, undoing a previous apply.
pub async fn revert_patch(patch_path: &Path, workspace: &Path) -> Result<(), RunnerError> {
    let patch_str = patch_path.display().to_string();
    let output = run_with_timeout(
        git(workspace, &["apply", "--reverse", &patch_str]),
        GIT_APPLY_TIMEOUT,
        "git apply --reverse",
    )
    .await
    .map_err(|message| RunnerError::Git { message })?;

    if !output.status.success() {
        return Err(RunnerError::Git {
            message: format!(
                "revert failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ),
        });
    }
    info!(patch = %patch_path.display(), "patch reverted");
    Ok(())
}

/// Parse `git apply --stat` output into (files, insertions, deletions).
fn parse_stat_output(stat: &str) -> (Vec<String>, u32, u32) {
    let mut files = Vec::new();
    let mut insertions = 0;
    let mut deletions = 0;

    for line in stat.lines() {
        let Some((name_part, change_part)) = line.split_once('|') else {
            continue;
        };
        let name = name_part.trim();
        if !name.is_empty() {
            files.push(name.to_string());
        }
        insertions += change_part.chars().filter(|c| *c == '+').count() as u32;
        deletions += change_part.chars().filter(|c| *c == '-').count() as u32;
    }

    (files, insertions, deletions)
}

#[cfg(test)]
#[path = "patch_tests.rs"]
mod tests;
