//! DistroBaker — sync tool for distribution git sync and build automation.
//!
//! This crate implements the synchronization core: resolving a component's
//! upstream revision, reconciling its source and destination git histories,
//! mirroring the lookaside blob cache, and submitting the resulting
//! downstream revision for a build. See [`dispatch`] for the two entry
//! points driven by the binary.

pub mod buildsys;
pub mod cache;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod git;
pub mod retry;
pub mod scm;
pub mod shell_exec;
pub mod sources;
pub mod state;
pub mod sync;

pub use error::DistroBakerError;
pub use state::Core;
