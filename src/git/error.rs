//! Git operation errors.

#[derive(Debug)]
pub enum GitError {
    /// A git subprocess exited non-zero; `stderr` is already trimmed.
    CommandFailed { cmd: String, stderr: String },
    /// The subprocess could not even be spawned.
    Spawn(std::io::Error),
    /// `pull --ff-only` refused because the two histories share no base.
    UnrelatedHistories,
}

impl std::fmt::Display for GitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GitError::CommandFailed { cmd, stderr } => write!(f, "`{cmd}` failed: {stderr}"),
            GitError::Spawn(e) => write!(f, "failed to spawn git: {e}"),
            GitError::UnrelatedHistories => {
                write!(f, "refusing to merge unrelated histories")
            }
        }
    }
}

impl std::error::Error for GitError {}
