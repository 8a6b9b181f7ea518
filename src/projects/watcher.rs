use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::event::EventKind;
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::loader::SessionLoader;
use super::{scan, ProjectSummary};
use crate::error::Result;

/// Latest scan result, shared read-only with pages.
pub type ProjectsSnapshot = Arc<Vec<ProjectSummary>>;

/// Watches the data root and republishes the project list after each burst of changes.
///
/// Subscribers first observe the most recent scan, then every later one. A change
/// anywhere under the root clears the whole session cache before rescanning.
pub struct ProjectWatcher {
    root: PathBuf,
    snapshot: watch::Receiver<ProjectsSnapshot>,
    trigger: mpsc::UnboundedSender<()>,
    shutdown: CancellationToken,
    watcher: Mutex<Option<RecommendedWatcher>>,
}

impl ProjectWatcher {
    /// Scan once, then start watching `root`.
    ///
    /// A missing root is not an error: nothing is watched and the snapshot stays empty.
    pub async fn start(root: PathBuf, debounce: Duration, loader: Arc<SessionLoader>) -> Self {
        let initial = scan(&root).await.unwrap_or_else(|e| {
            warn!("initial scan of {} failed: {}", root.display(), e);
            Vec::new()
        });
        info!("found {} projects under {}", initial.len(), root.display());

        let (snapshot_tx, snapshot) = watch::channel(Arc::new(initial));
        let (trigger, events) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let watcher = if root.is_dir() {
            match watch_root(&root, trigger.clone()) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!("cannot watch {}: {}", root.display(), e);
                    None
                }
            }
        } else {
            info!("{} does not exist; not watching", root.display());
            None
        };

        tokio::spawn(rescan_loop(
            root.clone(),
            debounce,
            events,
            snapshot_tx,
            loader,
            shutdown.clone(),
        ));

        Self {
            root,
            snapshot,
            trigger,
            shutdown,
            watcher: Mutex::new(watcher),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn subscribe(&self) -> watch::Receiver<ProjectsSnapshot> {
        self.snapshot.clone()
    }

    pub fn current(&self) -> ProjectsSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Request a rescan; goes through the same debounce as file events.
    pub fn refresh(&self) {
        let _ = self.trigger.send(());
    }

    /// Stop watching and complete the snapshot stream.
    pub fn dispose(&self) {
        self.shutdown.cancel();
        if self.watcher.lock().take().is_some() {
            debug!("stopped watching {}", self.root.display());
        }
    }
}

impl Drop for ProjectWatcher {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn watch_root(root: &Path, tx: mpsc::UnboundedSender<()>) -> Result<RecommendedWatcher> {
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| match res {
            Ok(event) => {
                if should_trigger_rescan(&event) {
                    let _ = tx.send(());
                }
            }
            Err(error) => warn!("watch error: {}", error),
        },
        Config::default(),
    )?;

    watcher.watch(root, RecursiveMode::Recursive)?;
    Ok(watcher)
}

fn should_trigger_rescan(event: &notify::Event) -> bool {
    !matches!(event.kind, EventKind::Access(_))
}

async fn rescan_loop(
    root: PathBuf,
    debounce: Duration,
    mut events: mpsc::UnboundedReceiver<()>,
    snapshot: watch::Sender<ProjectsSnapshot>,
    loader: Arc<SessionLoader>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            ev = events.recv() => {
                if ev.is_none() {
                    break;
                }
            }
        }

        // Quiet window: every further event restarts the timer.
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                ev = events.recv() => {
                    if ev.is_none() {
                        break;
                    }
                }
                _ = tokio::time::sleep(debounce) => break,
            }
        }

        loader.invalidate_all();
        match scan(&root).await {
            Ok(projects) => {
                debug!("rescan found {} projects", projects.len());
                snapshot.send_replace(Arc::new(projects));
            }
            Err(e) => warn!("rescan of {} failed: {}", root.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projects::index::tests::{write_session, VALID_LINE};
    use notify::event::{AccessKind, ModifyKind};
    use tempfile::tempdir;
    use tokio::time::timeout;

    fn event(kind: EventKind) -> notify::Event {
        notify::Event {
            kind,
            paths: vec![PathBuf::from("/tmp/p/a.jsonl")],
            attrs: notify::event::EventAttributes::default(),
        }
    }

    #[test]
    fn test_access_events_ignored() {
        assert!(!should_trigger_rescan(&event(EventKind::Access(
            AccessKind::Any
        ))));
        assert!(should_trigger_rescan(&event(EventKind::Modify(
            ModifyKind::Any
        ))));
    }

    #[tokio::test]
    async fn test_missing_root_starts_empty() {
        let dir = tempdir().unwrap();
        let watcher = ProjectWatcher::start(
            dir.path().join("missing"),
            Duration::from_millis(20),
            Arc::new(SessionLoader::new()),
        )
        .await;
        assert!(watcher.current().is_empty());
    }

    #[tokio::test]
    async fn test_burst_of_refreshes_collapses() {
        let dir = tempdir().unwrap();
        let watcher = ProjectWatcher::start(
            dir.path().join("missing"),
            Duration::from_millis(50),
            Arc::new(SessionLoader::new()),
        )
        .await;
        let mut rx = watcher.subscribe();
        rx.borrow_and_update();

        watcher.refresh();
        watcher.refresh();
        watcher.refresh();

        let mut changes = 0;
        while timeout(Duration::from_millis(400), rx.changed()).await.is_ok() {
            rx.borrow_and_update();
            changes += 1;
        }
        assert_eq!(changes, 1);
    }

    #[tokio::test]
    async fn test_dispose_completes_stream() {
        let dir = tempdir().unwrap();
        let watcher = ProjectWatcher::start(
            dir.path().to_path_buf(),
            Duration::from_millis(20),
            Arc::new(SessionLoader::new()),
        )
        .await;
        let mut rx = watcher.subscribe();
        rx.borrow_and_update();

        watcher.dispose();
        let res = timeout(Duration::from_secs(2), rx.changed()).await.unwrap();
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn test_file_change_rescans_and_clears_cache() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("proj-a");
        write_session(&p, "s-1.jsonl", &format!("{VALID_LINE}\n"), 5);

        let loader = Arc::new(SessionLoader::new());
        let watcher = ProjectWatcher::start(
            dir.path().to_path_buf(),
            Duration::from_millis(50),
            Arc::clone(&loader),
        )
        .await;
        let mut rx = watcher.subscribe();
        let summary = rx.borrow_and_update()[0].clone();

        let before = loader.load(&summary).await.unwrap();
        assert_eq!(before.sessions[0].branch.as_deref(), Some("main"));

        std::fs::write(
            p.join("s-1.jsonl"),
            r#"{"sessionId":"s-1","cwd":"/work/proj-a","gitBranch":"feature"}"#,
        )
        .unwrap();

        timeout(Duration::from_secs(5), rx.changed())
            .await
            .expect("rescan after file change")
            .unwrap();
        assert!(!loader.cache().contains(&summary.dir));

        let after = loader.load(&summary).await.unwrap();
        assert_eq!(after.sessions[0].branch.as_deref(), Some("feature"));
        assert_eq!(rx.borrow()[0].last_branch.as_deref(), Some("feature"));
    }
}
