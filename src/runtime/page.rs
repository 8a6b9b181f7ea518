use std::sync::Arc;

use async_trait::async_trait;
use crossterm::event::KeyEvent;
use ratatui::{layout::Rect, Frame};

use super::bus::PageContext;
use crate::error::{Error, Result};
use crate::projects::{ProjectSummary, SessionRecord};
use crate::ui::render;

/// Page identifiers known to the factory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    Projects,
    Sessions,
    Settings,
    Launch,
}

impl PageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageKind::Projects => "projects",
            PageKind::Sessions => "sessions",
            PageKind::Settings => "settings",
            PageKind::Launch => "launch",
        }
    }
}

/// Caller-supplied constructor arguments
#[derive(Debug, Clone, Default)]
pub struct PageArgs {
    pub project: Option<ProjectSummary>,
    pub session: Option<SessionRecord>,
}

impl PageArgs {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn project(project: ProjectSummary) -> Self {
        Self {
            project: Some(project),
            session: None,
        }
    }

    pub fn with_session(mut self, session: SessionRecord) -> Self {
        self.session = Some(session);
        self
    }

    pub fn require_project(&mut self, kind: PageKind) -> Result<ProjectSummary> {
        self.project
            .take()
            .ok_or_else(|| Error::page_construction(kind.as_str(), "argument `project`"))
    }
}

pub type SharedPage = Arc<tokio::sync::Mutex<Box<dyn Page>>>;

/// One interactive screen on the navigation stack.
///
/// Rendering is split in three fragments so a failing fragment can be replaced by
/// an error placeholder without taking the others down.
#[async_trait]
pub trait Page: Send {
    fn kind(&self) -> PageKind;

    fn title(&self) -> String;

    /// Runs each time the page becomes the active page.
    async fn initialize(&mut self, _ctx: &PageContext) -> Result<()> {
        Ok(())
    }

    /// Runs on the active page after a new project snapshot is published. The
    /// session cache has already been cleared by then.
    async fn projects_changed(&mut self, _ctx: &PageContext) -> Result<()> {
        Ok(())
    }

    fn render_header(&self, f: &mut Frame, area: Rect) -> Result<()> {
        render::title_bar(f, area, &self.title(), None);
        Ok(())
    }

    fn render_body(&mut self, f: &mut Frame, area: Rect) -> Result<()>;

    fn render_footer(&self, f: &mut Frame, area: Rect) -> Result<()> {
        render::key_hints(f, area, &self.key_hints());
        Ok(())
    }

    fn key_hints(&self) -> Vec<(&'static str, &'static str)> {
        vec![("Esc", "back"), ("q", "quit"), ("s", "settings")]
    }

    /// While true, every key goes to the page (global shortcuts are skipped).
    fn captures_input(&self) -> bool {
        false
    }

    /// Returns whether the key was recognized.
    async fn handle_key(&mut self, key: KeyEvent, ctx: &PageContext) -> Result<bool>;

    /// Pages returning true own the terminal through [`Page::run_full_control`]
    /// instead of the render loop.
    fn wants_full_control(&self) -> bool {
        false
    }

    async fn run_full_control(&mut self, _ctx: &PageContext) -> Result<()> {
        Ok(())
    }

    /// Release resources; called once when the page leaves the stack.
    fn dispose(&mut self) {}
}
