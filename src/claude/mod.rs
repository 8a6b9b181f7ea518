//! Launching the `claude` executable on the controlling terminal.

use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use tokio::process::{Child, Command};
use tracing::info;

use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LaunchMode {
    Resume(String),
    New,
}

/// A `claude` invocation: resume a session or start a new one in `cwd`.
#[derive(Debug, Clone)]
pub struct ClaudeLaunch {
    pub program: String,
    pub cwd: PathBuf,
    pub mode: LaunchMode,
}

impl ClaudeLaunch {
    pub fn resume(program: impl Into<String>, cwd: impl Into<PathBuf>, session_id: &str) -> Self {
        Self {
            program: program.into(),
            cwd: cwd.into(),
            mode: LaunchMode::Resume(session_id.to_string()),
        }
    }

    pub fn new_session(program: impl Into<String>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            cwd: cwd.into(),
            mode: LaunchMode::New,
        }
    }

    pub fn args(&self) -> Vec<String> {
        match &self.mode {
            LaunchMode::Resume(id) => vec!["--resume".to_string(), id.clone()],
            LaunchMode::New => Vec::new(),
        }
    }

    /// Human-readable command line for toasts and logs
    pub fn display(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args());
        parts.join(" ")
    }

    /// Spawn with inherited stdio; the child owns the terminal until it exits.
    pub fn spawn(&self) -> Result<Child> {
        if !is_dir(&self.cwd) {
            return Err(Error::launch(format!(
                "working directory {} does not exist",
                self.cwd.display()
            )));
        }

        info!("launching `{}` in {}", self.display(), self.cwd.display());
        Command::new(&self.program)
            .args(self.args())
            .current_dir(&self.cwd)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::launch(format!("{}: {}", self.program, e)))
    }
}

fn is_dir(path: &Path) -> bool {
    std::fs::metadata(path).map(|m| m.is_dir()).unwrap_or(false)
}

/// Describe a non-zero exit for the user.
pub fn describe_exit(status: ExitStatus) -> Option<String> {
    if status.success() {
        return None;
    }
    Some(match status.code() {
        Some(code) => format!("claude exited with status {code}"),
        None => "claude was terminated by a signal".to_string(),
    })
}
