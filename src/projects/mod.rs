mod cache;
mod header;
mod index;
mod loader;
mod watcher;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use cache::DetailCache;
pub use header::{parse_header_line, SessionHeader};
pub use index::{identity_from_dir_name, scan};
pub use loader::SessionLoader;
pub use watcher::{ProjectWatcher, ProjectsSnapshot};

#[cfg(test)]
pub(crate) use index::tests as test_support;

/// Extension of Claude session transcripts
pub const SESSION_EXTENSION: &str = "jsonl";

/// One project directory under the data root, summarized from its newest session headers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectSummary {
    pub name: String,
    /// Working directory the sessions were recorded in
    pub path: PathBuf,
    /// On-disk directory name (encoded path)
    pub dir_name: String,
    /// Absolute location of the project directory
    pub dir: PathBuf,
    pub session_count: usize,
    pub last_activity: Option<DateTime<Utc>>,
    pub last_branch: Option<String>,
    pub session_files: Vec<PathBuf>,
}

/// How a session row was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionKind {
    Normal,
    AiSummary,
    Corrupted,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Normal => "normal",
            SessionKind::AiSummary => "ai-summary",
            SessionKind::Corrupted => "corrupted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub cwd: Option<PathBuf>,
    pub timestamp: Option<DateTime<Utc>>,
    pub branch: Option<String>,
    pub preview: String,
    pub kind: SessionKind,
    pub file: PathBuf,
}

impl SessionRecord {
    /// Sessions that can be handed to `claude --resume`
    pub fn is_resumable(&self) -> bool {
        self.kind == SessionKind::Normal
    }
}

/// A project together with all of its sessions, oldest first.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectDetail {
    pub summary: ProjectSummary,
    pub sessions: Vec<SessionRecord>,
}
