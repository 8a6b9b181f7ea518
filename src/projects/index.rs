use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::header::{parse_header_line, SessionHeader};
use super::{ProjectSummary, SESSION_EXTENSION};
use crate::error::Result;

/// Claude replaces `/` with this character when naming project directories.
const ENCODED_SEPARATOR: char = '-';

/// Lines of a session file inspected when looking for `cwd`/`gitBranch`.
const MAX_HEADER_LINES: usize = 5;

/// Newest session files inspected per project before falling back to the directory name.
const MAX_HEADER_FILES: usize = 3;

/// Scan `root` for project directories and summarize each one.
///
/// A missing root yields an empty list. A project directory that cannot be read is
/// skipped with a warning; it never aborts the scan. Results are sorted by name.
pub async fn scan(root: &Path) -> Result<Vec<ProjectSummary>> {
    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!("projects root {} does not exist", root.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e.into()),
    };

    let (tx, mut rx) = mpsc::unbounded_channel::<Option<ProjectSummary>>();

    while let Some(entry) = entries.next_entry().await? {
        let is_dir = entry
            .file_type()
            .await
            .map(|ft| ft.is_dir())
            .unwrap_or(false);
        if !is_dir {
            continue;
        }

        let dir = entry.path();
        let tx = tx.clone();
        tokio::spawn(async move {
            let summary = match summarize_project(&dir).await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    warn!("skipping project {}: {}", dir.display(), e);
                    None
                }
            };
            let _ = tx.send(summary);
        });
    }
    drop(tx);

    let mut projects = Vec::new();
    while let Some(summary) = rx.recv().await {
        projects.extend(summary);
    }

    projects.sort_by(|a, b| {
        a.name
            .to_lowercase()
            .cmp(&b.name.to_lowercase())
            .then_with(|| a.name.cmp(&b.name))
            .then_with(|| a.dir_name.cmp(&b.dir_name))
    });

    debug!("scanned {} projects under {}", projects.len(), root.display());
    Ok(projects)
}

/// Reverse Claude's directory-name encoding.
///
/// A leading separator marks an encoded absolute path (`-work-app` → `/work/app`).
/// Names without it were not produced by the encoding and are used verbatim.
pub fn identity_from_dir_name(dir_name: &str) -> (PathBuf, String) {
    let Some(rest) = dir_name.strip_prefix(ENCODED_SEPARATOR) else {
        return (PathBuf::from(dir_name), dir_name.to_string());
    };

    let decoded = format!("/{}", rest.replace(ENCODED_SEPARATOR, "/"));
    let path = PathBuf::from(decoded);
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| dir_name.to_string());
    (path, name)
}

/// Session files in `dir`, newest first.
pub(super) async fn list_session_files(dir: &Path) -> Result<Vec<(PathBuf, SystemTime)>> {
    let mut entries = fs::read_dir(dir).await?;
    let mut files = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(SESSION_EXTENSION) {
            continue;
        }
        // Files can vanish between listing and stat; those simply drop out.
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((path, modified));
    }

    files.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(files)
}

async fn summarize_project(dir: &Path) -> Result<ProjectSummary> {
    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let files = list_session_files(dir).await?;

    let mut header: Option<(usize, SessionHeader)> = None;
    for (idx, (path, _)) in files.iter().take(MAX_HEADER_FILES).enumerate() {
        if let Some(h) = read_project_header(path).await {
            header = Some((idx, h));
            break;
        }
    }

    let newest_mtime = files.first().map(|(_, m)| DateTime::<Utc>::from(*m));
    let last_activity = match &header {
        Some((0, h)) => h.timestamp.or(newest_mtime),
        _ => newest_mtime,
    };

    let (path, name, last_branch) = match header {
        Some((_, h)) => {
            // read_project_header only returns headers carrying a cwd
            let cwd = h.cwd.unwrap_or_default();
            let name = cwd
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| cwd.display().to_string());
            (cwd, name, h.branch)
        }
        None => {
            let (path, name) = identity_from_dir_name(&dir_name);
            (path, name, None)
        }
    };

    let mut session_files: Vec<PathBuf> = files.into_iter().map(|(p, _)| p).collect();
    session_files.sort();

    Ok(ProjectSummary {
        name,
        path,
        dir_name,
        dir: dir.to_path_buf(),
        session_count: session_files.len(),
        last_activity,
        last_branch,
        session_files,
    })
}

/// First header line within `MAX_HEADER_LINES` that names a working directory.
async fn read_project_header(path: &Path) -> Option<SessionHeader> {
    let file = fs::File::open(path).await.ok()?;
    let mut lines = BufReader::new(file).lines();

    for _ in 0..MAX_HEADER_LINES {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            _ => return None,
        };
        if line.trim().is_empty() {
            continue;
        }
        let Ok(header) = parse_header_line(&line) else {
            continue;
        };
        if header.cwd.is_some() {
            return Some(header);
        }
    }
    None
}
