use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use crossterm::event::KeyEvent;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph},
    Frame,
};
use tokio::sync::watch;

use super::step;
use crate::config::AppConfig;
use crate::error::Result;
use crate::projects::{ProjectSummary, ProjectsSnapshot};
use crate::runtime::{Page, PageArgs, PageContext, PageKind, Services};
use crate::ui::input::{SearchEdit, SearchInput};
use crate::ui::render;

const PAGE_STEP: isize = 10;

/// Projects whose name matches the search query, in snapshot (name) order.
pub fn filter_projects<'a>(
    projects: &'a [ProjectSummary],
    search: &SearchInput,
) -> Vec<&'a ProjectSummary> {
    projects.iter().filter(|p| search.matches(&p.name)).collect()
}

/// Root page: every project under the data root, live-updated by the watcher.
pub struct ProjectListPage {
    config: Arc<AppConfig>,
    projects: watch::Receiver<ProjectsSnapshot>,
    search: SearchInput,
    selected: usize,
}

impl ProjectListPage {
    pub fn construct(services: &Services, _args: PageArgs) -> Result<Box<dyn Page>> {
        Ok(Box::new(Self {
            config: Arc::clone(&services.config),
            projects: services.projects.clone(),
            search: SearchInput::new(),
            selected: 0,
        }))
    }

    fn snapshot(&self) -> ProjectsSnapshot {
        self.projects.borrow().clone()
    }

    fn selected_project(&self) -> Option<ProjectSummary> {
        let snapshot = self.snapshot();
        let visible = filter_projects(&snapshot, &self.search);
        visible
            .get(render::clamp_selection(self.selected, visible.len()))
            .map(|p| (*p).clone())
    }

    fn move_selection(&mut self, delta: isize) {
        let len = filter_projects(&self.snapshot(), &self.search).len();
        self.selected = step(self.selected, delta, len);
    }

    fn render_search(&self, f: &mut Frame, area: Rect) {
        let style = if self.search.is_active() {
            Style::default().fg(Color::Yellow)
        } else {
            Style::default().fg(Color::DarkGray)
        };
        let bar = Paragraph::new(Line::from(vec![
            Span::styled("/ ", style),
            Span::raw(self.search.text().to_string()),
        ]))
        .block(Block::default().borders(Borders::ALL).title("Filter"));
        f.render_widget(bar, area);

        if self.search.is_active() {
            let offset = u16::try_from(self.search.cursor_char_pos()).unwrap_or(u16::MAX);
            let x = area.x.saturating_add(3).saturating_add(offset);
            f.set_cursor_position((x.min(area.right().saturating_sub(2)), area.y + 1));
        }
    }
}

fn project_item(project: &ProjectSummary, now: chrono::DateTime<Utc>) -> ListItem<'static> {
    let mut spans = vec![
        Span::styled(
            project.name.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        ),
        Span::raw("  "),
        Span::styled(
            format!("{} sessions", project.session_count),
            Style::default().fg(Color::Cyan),
        ),
        Span::raw("  "),
        Span::styled(
            render::relative_time(project.last_activity, now),
            Style::default().fg(Color::Green),
        ),
    ];
    if let Some(branch) = &project.last_branch {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            format!("⎇ {branch}"),
            Style::default().fg(Color::Magenta),
        ));
    }
    spans.push(Span::raw("  "));
    spans.push(Span::styled(
        project.path.display().to_string(),
        Style::default().fg(Color::DarkGray),
    ));
    ListItem::new(Line::from(spans))
}

#[async_trait]
impl Page for ProjectListPage {
    fn kind(&self) -> PageKind {
        PageKind::Projects
    }

    fn title(&self) -> String {
        "Claude Deck".to_string()
    }

    fn render_header(&self, f: &mut Frame, area: Rect) -> Result<()> {
        let root = self.config.projects_dir.display().to_string();
        render::title_bar(f, area, &self.title(), Some(&root));
        Ok(())
    }

    fn render_body(&mut self, f: &mut Frame, area: Rect) -> Result<()> {
        let area = if self.search.is_active() || !self.search.is_empty() {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(3), Constraint::Min(0)])
                .split(area);
            self.render_search(f, chunks[0]);
            chunks[1]
        } else {
            area
        };

        let snapshot = self.snapshot();
        if snapshot.is_empty() {
            render::empty_state(
                f,
                area,
                "Projects",
                &format!(
                    "No projects found in {}",
                    self.config.projects_dir.display()
                ),
            );
            return Ok(());
        }

        let visible = filter_projects(&snapshot, &self.search);
        self.selected = render::clamp_selection(self.selected, visible.len());
        if visible.is_empty() {
            render::empty_state(f, area, "Projects", "No project matches the filter");
            return Ok(());
        }

        let now = Utc::now();
        let items: Vec<ListItem> = visible.iter().map(|p| project_item(p, now)).collect();
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(format!(
                "Projects ({}/{})",
                self.selected + 1,
                visible.len()
            )))
            .highlight_style(
                Style::default()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            );

        let mut state = ListState::default().with_selected(Some(self.selected));
        f.render_stateful_widget(list, area, &mut state);
        Ok(())
    }

    fn key_hints(&self) -> Vec<(&'static str, &'static str)> {
        if self.search.is_active() {
            return vec![("Enter", "apply"), ("Esc", "clear")];
        }
        vec![
            ("Enter", "sessions"),
            ("/", "filter"),
            ("Ctrl+R", "rescan"),
            ("s", "settings"),
            ("q", "quit"),
        ]
    }

    fn captures_input(&self) -> bool {
        self.search.is_active() || !self.search.is_empty()
    }

    async fn handle_key(&mut self, key: KeyEvent, ctx: &PageContext) -> Result<bool> {
        if self.search.is_active() {
            return Ok(match self.search.handle_key(&key) {
                SearchEdit::Changed | SearchEdit::Cancelled => {
                    self.selected = 0;
                    true
                }
                SearchEdit::Ignored => false,
                _ => true,
            });
        }

        let config = Arc::clone(&self.config);
        let keys = &config.keybindings;
        if keys.matches("back", &key) && !self.search.is_empty() {
            self.search.reset();
            self.selected = 0;
        } else if keys.matches("search", &key) {
            self.search.open();
        } else if keys.matches("up", &key) {
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
            self.move_selection(isize::MAX / 2);
        } else if keys.matches("select", &key) {
            if let Some(project) = self.selected_project() {
                ctx.navigate_to(PageKind::Sessions, PageArgs::project(project))
                    .await?;
            }
        } else {
            return Ok(false);
        }
        Ok(true)
    }
}
