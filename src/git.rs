//! Source revision info for notifications.
//!
//! A kernel tree without git metadata (tarball checkout) is fine; every
//! helper returns `None` rather than failing.

use std::path::Path;

use crate::process::Cmd;

/// Short hash of `HEAD`.
pub fn head_commit(dir: &Path) -> Option<String> {
    git_output(dir, &["rev-parse", "--short", "HEAD"])
}

/// Subject line of the `HEAD` commit.
pub fn head_subject(dir: &Path) -> Option<String> {
    git_output(dir, &["log", "-1", "--pretty=%s"])
}

/// Current branch name (`None` on a detached head).
pub fn current_branch(dir: &Path) -> Option<String> {
    git_output(dir, &["rev-parse", "--abbrev-ref", "HEAD"]).filter(|b| b != "HEAD")
}

fn git_output(dir: &Path, args: &[&str]) -> Option<String> {
    let result = Cmd::new("git")
        .current_dir(dir)
        .args(args.iter().copied())
        .allow_fail()
        .run()
        .ok()?;
    if !result.success() {
        return None;
    }
    let out = result.stdout.trim();
    (!out.is_empty()).then(|| out.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_non_repo_yields_none() {
        let dir = tempdir().unwrap();
        assert!(head_commit(dir.path()).is_none());
        assert!(head_subject(dir.path()).is_none());
        assert!(current_branch(dir.path()).is_none());
    }

    #[test]
    fn test_repo_with_commit() {
        if !crate::process::exists("git") {
            eprintln!("Skipping git test (git not installed)");
            return;
        }
        let dir = tempdir().unwrap();
        let git = |args: &[&str]| {
            Cmd::new("git")
                .current_dir(dir.path())
                .args(args.iter().copied())
                .run()
                .unwrap();
        };
        git(&["init", "-q"]);
        git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        git(&[
            "-c",
            "user.name=t",
            "-c",
            "user.email=t@example.com",
            "commit",
            "-q",
            "--allow-empty",
            "-m",
            "arm64: initial defconfig",
        ]);

        assert!(head_commit(dir.path()).is_some());
        assert_eq!(
            head_subject(dir.path()).as_deref(),
            Some("arm64: initial defconfig")
        );
        assert_eq!(current_branch(dir.path()).as_deref(), Some("main"));
    }
}
