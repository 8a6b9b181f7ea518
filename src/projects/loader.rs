use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tokio::fs;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::cache::DetailCache;
use super::header::parse_header_line;
use super::index::list_session_files;
use super::{ProjectDetail, ProjectSummary, SessionKind, SessionRecord};
use crate::error::{Error, Result};

/// Upper bound on session files read concurrently by one load.
const MAX_CONCURRENT_READS: usize = 32;

/// Loads every session of a project, memoized per project directory.
#[derive(Debug)]
pub struct SessionLoader {
    cache: DetailCache,
    permits: Arc<Semaphore>,
}

impl SessionLoader {
    pub fn new() -> Self {
        Self {
            cache: DetailCache::new(),
            permits: Arc::new(Semaphore::new(MAX_CONCURRENT_READS)),
        }
    }

    pub fn cache(&self) -> &DetailCache {
        &self.cache
    }

    /// Drop every cached project.
    pub fn invalidate_all(&self) {
        debug!("clearing {} cached projects", self.cache.len());
        self.cache.clear();
    }

    /// Load (or fetch from cache) all sessions of `summary`, oldest first.
    ///
    /// The project directory is re-listed rather than trusting the summary's file
    /// list; a directory that disappeared since the scan is an error.
    pub async fn load(&self, summary: &ProjectSummary) -> Result<Arc<ProjectDetail>> {
        if let Some(detail) = self.cache.get(&summary.dir) {
            return Ok(detail);
        }

        let files = match list_session_files(&summary.dir).await {
            Ok(files) => files,
            Err(Error::Io(e)) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::ProjectMissing(summary.dir.clone()));
            }
            Err(e) => return Err(e),
        };

        let mut tasks = JoinSet::new();
        for (path, modified) in files {
            let permits = Arc::clone(&self.permits);
            tasks.spawn(async move {
                let _permit = permits.acquire_owned().await.ok();
                read_session_record(path, modified).await
            });
        }

        let mut sessions = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(record) => sessions.push(record),
                Err(e) => warn!("session read task failed: {}", e),
            }
        }

        sessions.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });

        debug!(
            "loaded {} sessions for {}",
            sessions.len(),
            summary.dir.display()
        );

        let detail = Arc::new(ProjectDetail {
            summary: summary.clone(),
            sessions,
        });
        self.cache.insert(summary.dir.clone(), Arc::clone(&detail));
        Ok(detail)
    }
}

impl Default for SessionLoader {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_first_line(path: &Path) -> std::io::Result<Option<String>> {
    let file = fs::File::open(path).await?;
    BufReader::new(file).lines().next_line().await
}

/// Turn one session file into exactly one row, synthesizing a placeholder when
/// the file is empty, unreadable or not a session transcript.
async fn read_session_record(path: PathBuf, modified: SystemTime) -> SessionRecord {
    let file_id = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let modified = Some(DateTime::<Utc>::from(modified));

    let placeholder = |kind: SessionKind, preview: String| SessionRecord {
        session_id: file_id.clone(),
        cwd: None,
        timestamp: modified,
        branch: None,
        preview,
        kind,
        file: path.clone(),
    };

    let line = match read_first_line(&path).await {
        Ok(Some(line)) if !line.trim().is_empty() => line,
        Ok(_) => return placeholder(SessionKind::Corrupted, "(empty session file)".into()),
        Err(e) => {
            debug!("cannot read {}: {}", path.display(), e);
            return placeholder(SessionKind::Corrupted, "(unreadable session file)".into());
        }
    };

    let header = match parse_header_line(&line) {
        Ok(header) => header,
        Err(_) => return placeholder(SessionKind::Corrupted, "(unparsable session file)".into()),
    };

    if header.is_summary() {
        let preview = header
            .summary
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| "(summary)".to_string());
        return placeholder(SessionKind::AiSummary, preview);
    }

    let Some(session_id) = header.session_id else {
        return placeholder(SessionKind::Corrupted, "(missing session id)".into());
    };

    SessionRecord {
        session_id,
        cwd: header.cwd,
        timestamp: header.timestamp.or(modified),
        branch: header.branch,
        preview: header.preview.unwrap_or_else(|| "(no preview)".to_string()),
        kind: SessionKind::Normal,
        file: path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projects::index::tests::{write_session, VALID_LINE};
    use crate::projects::scan;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_normal_and_corrupted() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("proj-a");
        write_session(&a, "s-1.jsonl", &format!("{VALID_LINE}\n"), 5);
        write_session(&a, "broken.jsonl", "not json at all", 60);

        let projects = scan(dir.path()).await.unwrap();
        let loader = SessionLoader::new();
        let detail = loader.load(&projects[0]).await.unwrap();

        assert_eq!(detail.sessions.len(), 2);
        let normal: Vec<_> = detail
            .sessions
            .iter()
            .filter(|s| s.kind == SessionKind::Normal)
            .collect();
        assert_eq!(normal.len(), 1);
        assert_eq!(normal[0].branch.as_deref(), Some("main"));
        assert_eq!(normal[0].session_id, "s-1");
        assert!(detail
            .sessions
            .iter()
            .any(|s| s.kind == SessionKind::Corrupted && s.session_id == "broken"));
    }

    #[tokio::test]
    async fn test_every_file_yields_one_row() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("p");
        write_session(&p, "empty.jsonl", "", 1);
        write_session(&p, "garbage.jsonl", "\u{0}\u{1}", 2);
        write_session(&p, "noid.jsonl", r#"{"type":"user","cwd":"/x"}"#, 3);
        write_session(
            &p,
            "summary.jsonl",
            r#"{"type":"summary","summary":"Fix login flow","leafUuid":"u"}"#,
            4,
        );
        write_session(&p, "ok.jsonl", VALID_LINE, 5);

        let projects = scan(dir.path()).await.unwrap();
        let detail = SessionLoader::new().load(&projects[0]).await.unwrap();

        assert_eq!(detail.sessions.len(), 5);
        let summary = detail
            .sessions
            .iter()
            .find(|s| s.session_id == "summary")
            .unwrap();
        assert_eq!(summary.kind, SessionKind::AiSummary);
        assert_eq!(summary.preview, "Fix login flow");
        let corrupted = detail
            .sessions
            .iter()
            .filter(|s| s.kind == SessionKind::Corrupted)
            .count();
        assert_eq!(corrupted, 3);
    }

    #[tokio::test]
    async fn test_sessions_sorted_by_timestamp() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("p");
        write_session(
            &p,
            "late.jsonl",
            r#"{"sessionId":"late","timestamp":"2025-05-01T00:00:00Z"}"#,
            100,
        );
        write_session(
            &p,
            "early.jsonl",
            r#"{"sessionId":"early","timestamp":"2024-01-01T00:00:00Z"}"#,
            1,
        );

        let projects = scan(dir.path()).await.unwrap();
        let detail = SessionLoader::new().load(&projects[0]).await.unwrap();
        let ids: Vec<_> = detail.sessions.iter().map(|s| s.session_id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }

    #[tokio::test]
    async fn test_cache_hit_until_invalidated() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("p");
        write_session(&p, "s.jsonl", r#"{"sessionId":"s","gitBranch":"one"}"#, 1);

        let projects = scan(dir.path()).await.unwrap();
        let loader = SessionLoader::new();
        let first = loader.load(&projects[0]).await.unwrap();
        assert!(loader.cache().contains(&projects[0].dir));

        std::fs::write(p.join("s.jsonl"), r#"{"sessionId":"s","gitBranch":"two"}"#).unwrap();
        let cached = loader.load(&projects[0]).await.unwrap();
        assert!(Arc::ptr_eq(&first, &cached));

        loader.invalidate_all();
        let fresh = loader.load(&projects[0]).await.unwrap();
        assert_eq!(fresh.sessions[0].branch.as_deref(), Some("two"));
    }

    #[tokio::test]
    async fn test_missing_project_dir_is_error() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("gone");
        write_session(&p, "s.jsonl", VALID_LINE, 1);
        let projects = scan(dir.path()).await.unwrap();
        std::fs::remove_dir_all(&p).unwrap();

        let err = SessionLoader::new().load(&projects[0]).await.unwrap_err();
        assert!(matches!(err, Error::ProjectMissing(_)));
    }
}
