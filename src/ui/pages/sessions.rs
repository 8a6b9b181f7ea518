use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use crossterm::event::KeyEvent;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState},
    Frame,
};
use tokio::sync::watch;
use tracing::debug;

use super::step;
use crate::config::AppConfig;
use crate::error::Result;
use crate::projects::{
    ProjectDetail, ProjectSummary, ProjectsSnapshot, SessionKind, SessionLoader, SessionRecord,
};
use crate::runtime::{Page, PageArgs, PageContext, PageKind, Services};
use crate::ui::render;

const PAGE_STEP: isize = 10;

/// Sessions of one project, newest first.
pub struct SessionListPage {
    config: Arc<AppConfig>,
    loader: Arc<SessionLoader>,
    projects: watch::Receiver<ProjectsSnapshot>,
    project: ProjectSummary,
    detail: Option<Arc<ProjectDetail>>,
    load_error: Option<String>,
    selected: usize,
}

impl SessionListPage {
    pub fn construct(services: &Services, mut args: PageArgs) -> Result<Box<dyn Page>> {
        let project = args.require_project(PageKind::Sessions)?;
        Ok(Box::new(Self {
            config: Arc::clone(&services.config),
            loader: Arc::clone(&services.loader),
            projects: services.projects.clone(),
            project,
            detail: None,
            load_error: None,
            selected: 0,
        }))
    }

    async fn reload(&mut self) -> Result<()> {
        match self.loader.load(&self.project).await {
            Ok(detail) => {
                debug!(
                    "{}: {} sessions",
                    self.project.name,
                    detail.sessions.len()
                );
                self.detail = Some(detail);
                self.load_error = None;
                Ok(())
            }
            Err(e) => {
                self.load_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    /// Display order: the detail is oldest first, the list shows newest first.
    fn rows(&self) -> Vec<&SessionRecord> {
        self.detail
            .as_ref()
            .map(|d| d.sessions.iter().rev().collect())
            .unwrap_or_default()
    }

    fn selected_session(&self) -> Option<SessionRecord> {
        let rows = self.rows();
        rows.get(render::clamp_selection(self.selected, rows.len()))
            .map(|s| (*s).clone())
    }

    fn move_selection(&mut self, delta: isize) {
        self.selected = step(self.selected, delta, self.rows().len());
    }

    async fn open_selected(&self, ctx: &PageContext) -> Result<()> {
        let Some(session) = self.selected_session() else {
            return Ok(());
        };
        if !session.is_resumable() {
            ctx.show_warning(format!(
                "{} session {} cannot be resumed",
                session.kind.as_str(),
                session.session_id
            ))
            .await?;
            return Ok(());
        }
        ctx.navigate_to(
            PageKind::Launch,
            PageArgs::project(self.project.clone()).with_session(session),
        )
        .await
    }
}

fn session_item(session: &SessionRecord, now: chrono::DateTime<Utc>) -> ListItem<'static> {
    let (marker, color) = match session.kind {
        SessionKind::Normal => ("●", Color::Green),
        SessionKind::AiSummary => ("Σ", Color::Blue),
        SessionKind::Corrupted => ("✕", Color::Red),
    };
    let short_id: String = session.session_id.chars().take(8).collect();

    let mut spans = vec![
        Span::styled(marker, Style::default().fg(color)),
        Span::raw(" "),
        Span::styled(
            format!("{:<9}", render::relative_time(session.timestamp, now)),
            Style::default().fg(Color::Green),
        ),
        Span::styled(short_id, Style::default().fg(Color::DarkGray)),
        Span::raw("  "),
    ];
    if let Some(branch) = &session.branch {
        spans.push(Span::styled(
            format!("⎇ {branch}  "),
            Style::default().fg(Color::Magenta),
        ));
    }
    let preview_style = match session.kind {
        SessionKind::Normal => Style::default(),
        _ => Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::ITALIC),
    };
    spans.push(Span::styled(session.preview.clone(), preview_style));
    ListItem::new(Line::from(spans))
}

#[async_trait]
impl Page for SessionListPage {
    fn kind(&self) -> PageKind {
        PageKind::Sessions
    }

    fn title(&self) -> String {
        self.project.name.clone()
    }

    fn render_header(&self, f: &mut Frame, area: Rect) -> Result<()> {
        let path = self.project.path.display().to_string();
        render::title_bar(f, area, &self.title(), Some(&path));
        Ok(())
    }

    async fn initialize(&mut self, _ctx: &PageContext) -> Result<()> {
        self.reload().await
    }

    async fn projects_changed(&mut self, _ctx: &PageContext) -> Result<()> {
        let latest = self
            .projects
            .borrow()
            .iter()
            .find(|p| p.dir == self.project.dir)
            .cloned();
        if let Some(project) = latest {
            self.project = project;
        }
        self.reload().await
    }

    fn render_body(&mut self, f: &mut Frame, area: Rect) -> Result<()> {
        if let Some(err) = &self.load_error {
            render::empty_state(f, area, "Sessions", err);
            return Ok(());
        }

        let rows = self.rows();
        if rows.is_empty() {
            let message = if self.detail.is_some() {
                "No sessions in this project"
            } else {
                "Loading sessions…"
            };
            render::empty_state(f, area, "Sessions", message);
            return Ok(());
        }

        let selected = render::clamp_selection(self.selected, rows.len());
        let now = Utc::now();
        let items: Vec<ListItem> = rows.iter().map(|s| session_item(s, now)).collect();
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(format!(
                "Sessions ({}/{})",
                selected + 1,
                rows.len()
            )))
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            );

        self.selected = selected;
        let mut state = ListState::default().with_selected(Some(selected));
        f.render_stateful_widget(list, area, &mut state);
        Ok(())
    }

    fn key_hints(&self) -> Vec<(&'static str, &'static str)> {
        vec![
            ("Enter", "resume"),
            ("n", "new session"),
            ("Esc", "back"),
            ("s", "settings"),
            ("q", "back"),
        ]
    }

    async fn handle_key(&mut self, key: KeyEvent, ctx: &PageContext) -> Result<bool> {
        let config = Arc::clone(&self.config);
        let keys = &config.keybindings;
        if keys.matches("up", &key) {
            self.move_selection(-1);
        } else if keys.matches("down", &key) {
            self.move_selection(1);
        } else if keys.matches("page_up", &key) {
            self.move_selection(-PAGE_STEP);
        } else if keys.matches("page_down", &key) {
            self.move_selection(PAGE_STEP);
        } else if keys.matches("top", &key) {
            self.selected = 0;
        } else if keys.matches("bottom", &key) {
            self.selected = self.rows().len().saturating_sub(1);
        } else if keys.matches("select", &key) {
            self.open_selected(ctx).await?;
        } else if keys.matches("new_session", &key) {
            ctx.navigate_to(PageKind::Launch, PageArgs::project(self.project.clone()))
                .await?;
        } else {
            return Ok(false);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::projects::test_support::{write_session, VALID_LINE};
    use crate::projects::scan;
    use crate::runtime::factory_tests::test_services;
    use crate::runtime::{channels, NavigationCommand, Severity, ToastCommand};
    use crossterm::event::{KeyCode, KeyModifiers};
    use std::time::Duration;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sessions_newest_first_and_resume() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("proj-a");
        write_session(&a, "s-1.jsonl", &format!("{VALID_LINE}\n"), 3600);
        write_session(&a, "empty.jsonl", "", 5);

        let project = scan(dir.path()).await.unwrap().remove(0);
        let services = test_services();
        let factory = Arc::new(crate::ui::pages::factory(services.clone()));
        let (ctx, mut buses) = channels(factory, Duration::from_secs(1));

        let mut page =
            SessionListPage::construct(&services, PageArgs::project(project)).unwrap();
        page.initialize(&ctx).await.unwrap();

        // Newest row is the empty file; it cannot be resumed.
        let enter = KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE);
        assert!(page.handle_key(enter, &ctx).await.unwrap());
        assert!(buses.navigation.try_recv().is_err());
        match buses.toasts.try_recv() {
            Ok(ToastCommand::Show(toast)) => assert_eq!(toast.severity, Severity::Warning),
            other => panic!("expected warning toast, got {:?}", other),
        }

        let down = KeyEvent::new(KeyCode::Down, KeyModifiers::NONE);
        page.handle_key(down, &ctx).await.unwrap();
        page.handle_key(enter, &ctx).await.unwrap();
        match buses.navigation.try_recv() {
            Ok(NavigationCommand::NavigateTo(next)) => assert_eq!(next.kind(), PageKind::Launch),
            other => panic!("expected launch page, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_project_reports_error() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("proj-a");
        write_session(&a, "s-1.jsonl", &format!("{VALID_LINE}\n"), 5);
        let project = scan(dir.path()).await.unwrap().remove(0);
        std::fs::remove_dir_all(&a).unwrap();

        let services = test_services();
        let factory = Arc::new(crate::ui::pages::factory(services.clone()));
        let (ctx, _buses) = channels(factory, Duration::from_secs(1));
        let mut page =
            SessionListPage::construct(&services, PageArgs::project(project)).unwrap();

        let err = page.initialize(&ctx).await.err().unwrap();
        assert!(matches!(err, crate::error::Error::ProjectMissing(_)));
    }

    #[tokio::test]
    async fn test_new_snapshot_reloads_sessions() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("proj-a");
        write_session(&a, "s-1.jsonl", &format!("{VALID_LINE}\n"), 60);
        let project = scan(dir.path()).await.unwrap().remove(0);

        let (snapshot_tx, projects) = watch::channel(Arc::new(vec![project.clone()]));
        let services = Services {
            projects,
            ..test_services()
        };
        let factory = Arc::new(crate::ui::pages::factory(services.clone()));
        let (ctx, _buses) = channels(factory, Duration::from_secs(1));
        let mut page = SessionListPage {
            config: Arc::clone(&services.config),
            loader: Arc::clone(&services.loader),
            projects: services.projects.clone(),
            project,
            detail: None,
            load_error: None,
            selected: 0,
        };
        page.initialize(&ctx).await.unwrap();
        assert_eq!(page.rows().len(), 1);

        // Cached until the watcher clears the cache and publishes a new scan.
        write_session(&a, "s-2.jsonl", "", 1);
        page.initialize(&ctx).await.unwrap();
        assert_eq!(page.rows().len(), 1);

        services.loader.invalidate_all();
        snapshot_tx.send_replace(Arc::new(scan(dir.path()).await.unwrap()));
        page.projects_changed(&ctx).await.unwrap();
        assert_eq!(page.rows().len(), 2);
        assert_eq!(page.project.session_count, 2);
    }
}
