use std::path::PathBuf;

use async_trait::async_trait;
use crossterm::event::KeyEvent;
use ratatui::{layout::Rect, Frame};
use tokio::process::Child;
use tracing::{info, warn};

use crate::claude::{describe_exit, ClaudeLaunch};
use crate::error::Result;
use crate::runtime::{Page, PageArgs, PageContext, PageKind, Services};
use crate::ui::render;

/// Hands the terminal to `claude` until it exits.
pub struct LaunchPage {
    launch: ClaudeLaunch,
    child: Option<Child>,
}

impl LaunchPage {
    pub fn new(program: impl Into<String>, mut args: PageArgs) -> Result<Self> {
        let project = args.require_project(PageKind::Launch)?;
        let launch = match args.session {
            Some(session) => {
                let cwd: PathBuf = session.cwd.unwrap_or(project.path);
                ClaudeLaunch::resume(program, cwd, &session.session_id)
            }
            None => ClaudeLaunch::new_session(program, project.path),
        };
        Ok(Self {
            launch,
            child: None,
        })
    }

    pub fn construct(services: &Services, args: PageArgs) -> Result<Box<dyn Page>> {
        Ok(Box::new(Self::new(services.config.claude_bin.clone(), args)?))
    }

    pub fn launch(&self) -> &ClaudeLaunch {
        &self.launch
    }
}

#[async_trait]
impl Page for LaunchPage {
    fn kind(&self) -> PageKind {
        PageKind::Launch
    }

    fn title(&self) -> String {
        format!("Running {}", self.launch.display())
    }

    fn render_body(&mut self, f: &mut Frame, area: Rect) -> Result<()> {
        render::empty_state(
            f,
            area,
            "Launch",
            &format!("{} in {}", self.launch.display(), self.launch.cwd.display()),
        );
        Ok(())
    }

    async fn handle_key(&mut self, _key: KeyEvent, _ctx: &PageContext) -> Result<bool> {
        Ok(false)
    }

    fn wants_full_control(&self) -> bool {
        true
    }

    async fn run_full_control(&mut self, ctx: &PageContext) -> Result<()> {
        let child = self.child.insert(self.launch.spawn()?);

        // Ctrl+C belongs to the child while it runs.
        let status = loop {
            tokio::select! {
                status = child.wait() => break status,
                _ = tokio::signal::ctrl_c() => continue,
            }
        };
        self.child = None;

        let status = status?;
        info!("`{}` exited with {}", self.launch.display(), status);
        match describe_exit(status) {
            Some(message) => ctx.show_error(message).await?,
            None => ctx.show_success(format!("{} finished", self.launch.display())).await?,
        }
        Ok(())
    }

    fn dispose(&mut self) {
        if let Some(child) = self.child.as_mut() {
            if let Err(e) = child.start_kill() {
                warn!("failed to stop `{}`: {}", self.launch.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projects::{ProjectSummary, SessionKind, SessionRecord};
    use crate::runtime::factory_tests::test_services;
    use crate::runtime::{channels, Severity, ToastCommand};
    use std::sync::Arc;
    use std::time::Duration;

    fn project() -> ProjectSummary {
        ProjectSummary {
            name: "proj-a".to_string(),
            path: PathBuf::from("/work/proj-a"),
            dir_name: "-work-proj-a".to_string(),
            dir: PathBuf::from("/data/-work-proj-a"),
            session_count: 1,
            last_activity: None,
            last_branch: None,
            session_files: Vec::new(),
        }
    }

    fn session(cwd: Option<&str>) -> SessionRecord {
        SessionRecord {
            session_id: "s-1".to_string(),
            cwd: cwd.map(PathBuf::from),
            timestamp: None,
            branch: None,
            preview: String::new(),
            kind: SessionKind::Normal,
            file: PathBuf::from("/data/-work-proj-a/s-1.jsonl"),
        }
    }

    fn build(args: PageArgs) -> LaunchPage {
        LaunchPage::new("claude", args).unwrap()
    }

    #[test]
    fn test_construct_requires_project() {
        let services = test_services();
        let err = LaunchPage::construct(&services, PageArgs::none())
            .err()
            .unwrap();
        assert!(err.to_string().contains("project"));
    }

    #[test]
    fn test_resume_uses_session_cwd() {
        let page = build(PageArgs::project(project()).with_session(session(Some("/elsewhere"))));
        assert_eq!(page.launch().cwd, PathBuf::from("/elsewhere"));
        assert_eq!(page.launch().args(), vec!["--resume", "s-1"]);

        let page = build(PageArgs::project(project()).with_session(session(None)));
        assert_eq!(page.launch().cwd, PathBuf::from("/work/proj-a"));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_returned() {
        let services = test_services();
        let factory = Arc::new(crate::ui::pages::factory(services.clone()));
        let (ctx, mut buses) = channels(factory, Duration::from_secs(1));

        let mut page = build(PageArgs::project(project()));
        assert!(page.wants_full_control());
        assert!(page.run_full_control(&ctx).await.is_err());
        assert!(page.child.is_none());
        assert!(!matches!(
            buses.toasts.try_recv(),
            Ok(ToastCommand::Show(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_raises_toast() {
        let dir = tempfile::tempdir().unwrap();
        let services = test_services();
        let factory = Arc::new(crate::ui::pages::factory(services.clone()));
        let (ctx, mut buses) = channels(factory, Duration::from_secs(1));

        let mut page = LaunchPage {
            launch: ClaudeLaunch::new_session("false", dir.path()),
            child: None,
        };
        page.run_full_control(&ctx).await.unwrap();

        match buses.toasts.try_recv() {
            Ok(ToastCommand::Show(toast)) => assert!(toast.message.contains("status 1")),
            other => panic!("expected error toast, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_raises_success_toast() {
        let dir = tempfile::tempdir().unwrap();
        let services = test_services();
        let factory = Arc::new(crate::ui::pages::factory(services.clone()));
        let (ctx, mut buses) = channels(factory, Duration::from_secs(1));

        let mut page = LaunchPage {
            launch: ClaudeLaunch::new_session("true", dir.path()),
            child: None,
        };
        page.run_full_control(&ctx).await.unwrap();

        match buses.toasts.try_recv() {
            Ok(ToastCommand::Show(toast)) => assert_eq!(toast.severity, Severity::Success),
            other => panic!("expected success toast, got {:?}", other),
        }
    }

    /// Process state letter from `/proc/<pid>/stat`, `None` once it is gone.
    #[cfg(target_os = "linux")]
    fn process_state(pid: &str) -> Option<char> {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        stat.rsplit_once(')')?.1.trim_start().chars().next()
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_pop_stops_running_child() {
        use crate::runtime::NavigationStack;
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let pid_file = dir.path().join("pid");
        let script = dir.path().join("fake-claude");
        std::fs::write(
            &script,
            format!("#!/bin/sh\necho $$ > {}\nexec sleep 30\n", pid_file.display()),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let services = test_services();
        let factory = Arc::new(crate::ui::pages::factory(services.clone()));
        let (ctx, _buses) = channels(factory, Duration::from_secs(1));

        let stack = Arc::new(NavigationStack::new());
        stack.push(Box::new(LaunchPage {
            launch: ClaudeLaunch::new_session(script.display().to_string(), dir.path()),
            child: None,
        }));
        let active = stack.current().unwrap();
        let runner = tokio::spawn(async move { active.run_full_control(&ctx).await });

        let mut pid = String::new();
        for _ in 0..200 {
            pid = std::fs::read_to_string(&pid_file).unwrap_or_default().trim().to_string();
            if !pid.is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(!pid.is_empty(), "child never started");

        let popped = tokio::time::timeout(Duration::from_secs(3), stack.pop()).await;
        assert!(popped.is_ok(), "pop blocked behind the running child");
        assert!(runner.await.unwrap().is_none());

        let mut stopped = false;
        for _ in 0..200 {
            if matches!(process_state(&pid), None | Some('Z')) {
                stopped = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(stopped, "child {pid} still running after pop");
    }
}
