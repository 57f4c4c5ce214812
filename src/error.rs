//! The error taxonomy of the synchronization core.
//!
//! Every public entry point in [`crate::scm`], [`crate::sources`],
//! [`crate::config`], [`crate::buildsys`], [`crate::cache`], [`crate::sync`]
//! and [`crate::dispatch`] returns `Option<T>`, not `Result<T, E>` — a
//! failure is logged once, at the point it is discovered, and converted to
//! `None` before it crosses a component boundary. `DistroBakerError` exists
//! to distinguish error *kinds* inside a component's implementation (so a
//! caller can match on "config validation failed" vs "transient I/O
//! failed"); `anyhow::Error` is used for everything else that only needs to
//! propagate with `?` and be logged.

use std::fmt;

#[derive(Debug)]
pub enum DistroBakerError {
    /// The core has no active configuration, or the operation targets an
    /// excluded component. Never retried.
    ControlState(String),
    /// A required configuration field is missing or malformed. Names the
    /// dotted path, e.g. `"configuration.trigger"`.
    ConfigValidation(String),
    /// A sources manifest line, module string, or dispatch entry failed to
    /// parse.
    ParseError(String),
    /// A network or subprocess operation (clone/fetch/push, cache
    /// probe/download/upload, build-system RPC) failed after exhausting
    /// retries.
    TransientIo(String),
    /// Unrelated histories in pull mode, or a merge conflict in merge mode.
    LogicalMergeFailure(String),
    /// Module building. Acknowledged as never implemented.
    Unimplemented(String),
}

impl fmt::Display for DistroBakerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DistroBakerError::ControlState(msg) => write!(f, "{msg}"),
            DistroBakerError::ConfigValidation(path) => {
                write!(f, "Configuration error: {path} missing")
            }
            DistroBakerError::ParseError(msg) => write!(f, "{msg}"),
            DistroBakerError::TransientIo(msg) => write!(f, "{msg}"),
            DistroBakerError::LogicalMergeFailure(msg) => write!(f, "{msg}"),
            DistroBakerError::Unimplemented(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for DistroBakerError {}

impl DistroBakerError {
    /// Log this error at the level its taxonomy class calls for in the
    /// error handling design, then return `None` — the standard shape of a
    /// component boundary.
    pub fn log_and_none<T>(self) -> Option<T> {
        match &self {
            DistroBakerError::ControlState(msg) => log::error!("critical: {msg}"),
            DistroBakerError::ConfigValidation(_) => log::error!("{self}"),
            DistroBakerError::ParseError(msg) => log::error!("{msg}"),
            DistroBakerError::TransientIo(msg) => log::error!("{msg}"),
            DistroBakerError::LogicalMergeFailure(msg) => log::error!("{msg}"),
            DistroBakerError::Unimplemented(msg) => log::error!("critical: {msg}"),
        }
        None
    }
}
