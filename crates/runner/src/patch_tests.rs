// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::PathBuf;

/// A scratch git repository with one committed file.
async fn scratch_repo() -> (tempfile::TempDir, PathBuf) {
    let tmp = tempfile::tempdir().unwrap();
    let repo = tmp.path().to_path_buf();

    for args in [
        vec!["init", "-q"],
        vec!["config", "user.email", "tests@example.test"],
        vec!["config", "user.name", "tests"],
    ] {
        let output = run_with_timeout(
            git(&repo, &args),
            std::time::Duration::from_secs(10),
            "git setup",
        )
        .await
        .unwrap();
        assert!(output.status.success());
    }

    std::fs::write(repo.join("main.py"), "print('one')\n").unwrap();
    for args in [vec!["add", "."], vec!["commit", "-q", "-m", "init"]] {
        let output = run_with_timeout(
            git(&repo, &args),
            std::time::Duration::from_secs(10),
            "git commit",
        )
        .await
        .unwrap();
        assert!(output.status.success());
    }

    (tmp, repo)
}

#[tokio::test]
async fn clean_tree_yields_an_empty_patch() {
    let (_tmp, repo) = scratch_repo().await;
    let patch = generate_patch(&repo, true).await.unwrap();
    assert!(patch.is_empty(), "{patch}");
    assert!(changed_files(&repo).await.unwrap().is_empty());
}

#[tokio::test]
async fn modifications_show_up_as_a_unified_diff() {
    let (_tmp, repo) = scratch_repo().await;
    std::fs::write(repo.join("main.py"), "print('two')\n").unwrap();

    let patch = generate_patch(&repo, false).await.unwrap();
    assert!(patch.contains("--- a/main.py"));
    assert!(patch.contains("+++ b/main.py"));
    assert!(patch.contains("-print('one')"));
    assert!(patch.contains("+print('two')"));

    assert_eq!(changed_files(&repo).await.unwrap(), vec!["main.py"]);
}

#[tokio::test]
async fn untracked_files_become_zero_context_entries() {
    let (_tmp, repo) = scratch_repo().await;
    std::fs::write(repo.join("new.py"), "a = 1\nb = 2\n").unwrap();

    let patch = generate_patch(&repo, true).await.unwrap();
    assert!(patch.contains("--- /dev/null"));
    assert!(patch.contains("+++ b/new.py"));
    assert!(patch.contains("@@ -0,0 +1,2 @@"));
    assert!(patch.contains("+a = 1"));

    // Excluded when untracked capture is off
    let without = generate_patch(&repo, false).await.unwrap();
    assert!(!without.contains("new.py"));
}

#[tokio::test]
async fn apply_requires_approval() {
    let (_tmp, repo) = scratch_repo().await;
    let patch_path = repo.join("changes.patch");
    std::fs::write(&patch_path, "").unwrap();

    let err = apply_patch(&patch_path, &repo, false).await.unwrap_err();
    assert!(matches!(err, RunnerError::SecurityRefused { .. }));
}

#[tokio::test]
async fn generate_apply_revert_round_trips() {
    let (_tmp, repo) = scratch_repo().await;

    // Make a change, capture it, then restore the tree
    std::fs::write(repo.join("main.py"), "print('two')\n").unwrap();
    let patch = generate_patch(&repo, false).await.unwrap();
    let patch_path = repo.join("changes.patch");
    std::fs::write(&patch_path, &patch).unwrap();

    let checkout = run_with_timeout(
        git(&repo, &["checkout", "--", "main.py"]),
        std::time::Duration::from_secs(10),
        "git checkout",
    )
    .await
    .unwrap();
    assert!(checkout.status.success());
    assert_eq!(
        std::fs::read_to_string(repo.join("main.py")).unwrap(),
        "print('one')\n"
    );

    // Preview against the clean tree
    let preview = preview_patch(&patch_path, &repo).await.unwrap();
    assert!(preview.can_apply, "{:?}", preview.apply_errors);
    assert_eq!(preview.files_affected, vec!["main.py"]);
    assert_eq!(preview.insertions, 1);
    assert_eq!(preview.deletions, 1);

    // Apply restores the modified state
    apply_patch(&patch_path, &repo, true).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(repo.join("main.py")).unwrap(),
        "print('two')\n"
    );

    // Revert returns to the pre-state
    revert_patch(&patch_path, &repo).await.unwrap();
    assert_eq!(
        std::fs::read_to_string(repo.join("main.py")).unwrap(),
        "print('one')\n"
    );
}

#[tokio::test]
async fn conflicting_patch_fails_the_dry_run() {
    let (_tmp, repo) = scratch_repo().await;
    std::fs::write(repo.join("main.py"), "print('two')\n").unwrap();
    let patch = generate_patch(&repo, false).await.unwrap();
    let patch_path = repo.join("changes.patch");
    std::fs::write(&patch_path, &patch).unwrap();

    // Tree already contains the change: applying again can't work
    let preview = preview_patch(&patch_path, &repo).await.unwrap();
    assert!(!preview.can_apply);
    assert!(preview.apply_errors.is_some());
}

#[test]
fn stat_output_parses() {
    let stat = " main.py | 2 +-\n helper.py | 5 ++++-\n 2 files changed, 5 insertions(+), 2 deletions(-)";
    let (files, insertions, deletions) = parse_stat_output(stat);
    assert_eq!(files, vec!["main.py", "helper.py"]);
    assert_eq!(insertions, 5);
    assert_eq!(deletions, 2);
}
