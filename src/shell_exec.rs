//! Command execution with logging and timing.
//!
//! `Cmd` is the only way the rest of this crate shells out to `git`. Every
//! invocation is logged at debug level before it runs and traced (with
//! duration and outcome) after, mirroring how a service this size wants its
//! subprocess boundary instrumented.

use std::path::Path;
use std::process::{Command, Output};
use std::time::Instant;

use anyhow::{Context, anyhow};

pub struct Cmd {
    inner: Command,
    program: String,
    args: Vec<String>,
    context: Option<String>,
}

impl Cmd {
    pub fn new(program: &str) -> Self {
        Cmd { inner: Command::new(program), program: program.to_string(), args: Vec::new(), context: None }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<std::ffi::OsStr>,
    {
        for a in args {
            self.args.push(a.as_ref().to_string_lossy().to_string());
            self.inner.arg(a);
        }
        self
    }

    pub fn current_dir(mut self, dir: &Path) -> Self {
        self.inner.current_dir(dir);
        self
    }

    /// Label used in log lines, e.g. `"rpms/gzip"`.
    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    fn cmd_str(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Run the command, logging before and a trace line with timing after.
    pub fn run(mut self) -> std::io::Result<Output> {
        let cmd_str = self.cmd_str();
        match &self.context {
            Some(ctx) => log::debug!("$ {cmd_str} [{ctx}]"),
            None => log::debug!("$ {cmd_str}"),
        }

        let t0 = Instant::now();
        let result = self.inner.output();
        let dur_ms = t0.elapsed().as_secs_f64() * 1000.0;

        match (&result, &self.context) {
            (Ok(out), Some(ctx)) => log::debug!(
                "[db-trace] context={ctx} cmd=\"{cmd_str}\" dur={dur_ms:.1}ms ok={}",
                out.status.success()
            ),
            (Ok(out), None) => {
                log::debug!("[db-trace] cmd=\"{cmd_str}\" dur={dur_ms:.1}ms ok={}", out.status.success())
            }
            (Err(e), Some(ctx)) => {
                log::debug!("[db-trace] context={ctx} cmd=\"{cmd_str}\" dur={dur_ms:.1}ms err=\"{e}\"")
            }
            (Err(e), None) => log::debug!("[db-trace] cmd=\"{cmd_str}\" dur={dur_ms:.1}ms err=\"{e}\""),
        }

        result
    }

    /// Run and require a zero exit status; stderr (trimmed) becomes the
    /// error message.
    pub fn run_checked(self) -> anyhow::Result<Output> {
        let cmd_str = self.cmd_str();
        let output = self.run().with_context(|| format!("failed to spawn `{cmd_str}`"))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("`{cmd_str}` failed: {}", stderr.trim()));
        }
        Ok(output)
    }

    /// Run and require success, returning trimmed stdout as a string.
    pub fn run_output(self) -> anyhow::Result<String> {
        let output = self.run_checked()?;
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_checked_succeeds_on_zero_exit() {
        let out = Cmd::new("true").run_checked();
        assert!(out.is_ok());
    }

    #[test]
    fn run_checked_fails_on_nonzero_exit() {
        let out = Cmd::new("false").run_checked();
        assert!(out.is_err());
    }

    #[test]
    fn run_output_trims_trailing_newline() {
        let out = Cmd::new("echo").args(["hello"]).run_output().unwrap();
        assert_eq!(out, "hello");
    }
}
