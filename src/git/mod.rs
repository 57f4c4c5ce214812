//! Git plumbing for component synchronization (used by [`crate::sync`] and
//! [`crate::config::load_config`]).
//!
//! `Repository` wraps a working tree checked out at some local path and
//! exposes exactly the operations the sync pipeline needs, each a thin,
//! named layer over [`crate::shell_exec::Cmd`]. It does not attempt to be a
//! general git library.

mod error;

pub use error::GitError;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::shell_exec::Cmd;

pub struct Repository {
    path: PathBuf,
}

impl Repository {
    /// Open an already-checked-out repository at `path` without touching it.
    pub fn at(path: &Path) -> Self {
        Repository { path: path.to_path_buf() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `git clone --depth 1 --branch <refname> <url> <dest>`.
    pub fn shallow_clone(url: &str, refname: &str, dest: &Path) -> Result<Repository> {
        Cmd::new("git")
            .args(["clone", "--quiet", "--depth", "1", "--branch", refname, url])
            .args([dest.as_os_str()])
            .context(format!("clone {url}"))
            .run_checked()
            .with_context(|| format!("failed to clone {url}#{refname}"))?;
        Ok(Repository { path: dest.to_path_buf() })
    }

    /// `git init` an empty repository at `path`, for the merge/pull scratch
    /// tree that `sync_repo` builds source and destination remotes into.
    pub fn init(path: &Path) -> Result<Repository> {
        Cmd::new("git").args(["init", "--quiet"]).current_dir(path).run_checked()?;
        Ok(Repository { path: path.to_path_buf() })
    }

    pub fn add_remote(&self, name: &str, url: &str) -> Result<()> {
        Cmd::new("git")
            .args(["remote", "add", name, url])
            .current_dir(&self.path)
            .context(format!("add remote {name}"))
            .run_checked()?;
        Ok(())
    }

    /// `git fetch --depth 1 <remote> [refspec]`. With `refspec` absent,
    /// fetches every branch the remote's default refspec covers rather than
    /// a single named ref.
    pub fn fetch(&self, remote: &str, refspec: Option<&str>) -> Result<()> {
        let mut args = vec!["fetch", "--quiet", "--depth", "1", remote];
        if let Some(r) = refspec {
            args.push(r);
        }
        Cmd::new("git")
            .args(args)
            .current_dir(&self.path)
            .context(format!("fetch {remote} {}", refspec.unwrap_or("(all)")))
            .run_checked()?;
        Ok(())
    }

    pub fn set_identity(&self, name: &str, email: &str) -> Result<()> {
        Cmd::new("git")
            .args(["config", "user.name", name])
            .current_dir(&self.path)
            .run_checked()?;
        Cmd::new("git")
            .args(["config", "user.email", email])
            .current_dir(&self.path)
            .run_checked()?;
        Ok(())
    }

    pub fn checkout(&self, rev: &str) -> Result<()> {
        Cmd::new("git")
            .args(["checkout", "--quiet", rev])
            .current_dir(&self.path)
            .context(format!("checkout {rev}"))
            .run_checked()?;
        Ok(())
    }

    pub fn switch_new_branch(&self, branch: &str) -> Result<()> {
        Cmd::new("git")
            .args(["switch", "--quiet", "-c", branch])
            .current_dir(&self.path)
            .context(format!("create branch {branch}"))
            .run_checked()?;
        Ok(())
    }

    /// `git merge --allow-unrelated-histories --no-commit -s ours <rev>`,
    /// the first half of a squash-merge: brings `rev`'s tree into the index
    /// without touching the working tree's own history.
    pub fn merge_ours_no_commit(&self, rev: &str) -> Result<()> {
        Cmd::new("git")
            .args(["merge", "--allow-unrelated-histories", "--no-commit", "-s", "ours", rev])
            .current_dir(&self.path)
            .context(format!("merge -s ours {rev}"))
            .run_checked()?;
        Ok(())
    }

    /// `git merge --no-commit --squash <branch>`, the second half: folds the
    /// temporary branch's tree (now identical to the destination) onto the
    /// checked-out branch as a single pending change.
    pub fn merge_squash_no_commit(&self, branch: &str) -> Result<()> {
        Cmd::new("git")
            .args(["merge", "--no-commit", "--squash", branch])
            .current_dir(&self.path)
            .context(format!("squash merge {branch}"))
            .run_checked()?;
        Ok(())
    }

    pub fn commit_empty(&self, author: &str, email: &str, message: &str) -> Result<()> {
        Cmd::new("git")
            .args(["commit", "--allow-empty", "--author", &format!("{author} <{email}>"), "-m", message])
            .current_dir(&self.path)
            .context("commit")
            .run_checked()?;
        Ok(())
    }

    pub fn commit_with_file(&self, author: &str, email: &str, msgfile: &Path) -> Result<()> {
        Cmd::new("git")
            .args(["commit", "--allow-empty", "--author", &format!("{author} <{email}>"), "-F"])
            .args([msgfile.as_os_str()])
            .current_dir(&self.path)
            .context("commit -F")
            .run_checked()?;
        Ok(())
    }

    pub fn delete_branch(&self, branch: &str) -> Result<()> {
        Cmd::new("git")
            .args(["branch", "-D", branch])
            .current_dir(&self.path)
            .run_checked()?;
        Ok(())
    }

    /// `git pull --ff-only <remote> <refname>`. Distinguishes an
    /// unrelated-histories refusal from any other failure so callers can
    /// fall back to `sync_repo`'s merge path without retrying a pull that
    /// will never succeed.
    pub fn pull_ff_only(&self, remote: &str, refname: &str) -> std::result::Result<(), GitError> {
        let output = Cmd::new("git")
            .args(["pull", "--quiet", "--ff-only", remote, refname])
            .current_dir(&self.path)
            .run()
            .map_err(GitError::Spawn)?;
        if output.status.success() {
            return Ok(());
        }
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        if stderr.contains("refusing to merge unrelated histories") {
            return Err(GitError::UnrelatedHistories);
        }
        Err(GitError::CommandFailed { cmd: "git pull --ff-only".to_string(), stderr })
    }

    /// `git push [--dry-run] <remote> <refspec>`.
    pub fn push(&self, remote: &str, refspec: &str, dry_run: bool) -> Result<()> {
        let mut args = vec!["push", "--quiet"];
        if dry_run {
            args.push("--dry-run");
        }
        args.push(remote);
        args.push(refspec);
        Cmd::new("git")
            .args(args)
            .current_dir(&self.path)
            .context(format!("push {remote} {refspec}"))
            .run_checked()?;
        Ok(())
    }

    pub fn head_rev(&self) -> Result<String> {
        Cmd::new("git").args(["rev-parse", "HEAD"]).current_dir(&self.path).run_output()
    }

    /// Whether `rev` resolves to an object in this repository.
    pub fn rev_parse_exists(&self, rev: &str) -> bool {
        Cmd::new("git")
            .args(["rev-parse", "--verify", "--quiet", rev])
            .current_dir(&self.path)
            .run_checked()
            .is_ok()
    }

    /// Read a file's contents at the current checkout.
    pub fn read_file(&self, relpath: &str) -> Result<String> {
        let full = self.path.join(relpath);
        std::fs::read_to_string(&full).with_context(|| format!("reading {}", full.display()))
    }
}
