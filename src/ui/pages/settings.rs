use std::sync::Arc;

use async_trait::async_trait;
use crossterm::event::KeyEvent;
use ratatui::{
    layout::Rect,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

use crate::config::AppConfig;
use crate::error::Result;
use crate::runtime::{Page, PageArgs, PageContext, PageKind, Services};

/// Read-only view of the resolved configuration and key bindings.
pub struct SettingsPage {
    config: Arc<AppConfig>,
    scroll: u16,
}

impl SettingsPage {
    pub fn construct(services: &Services, _args: PageArgs) -> Result<Box<dyn Page>> {
        Ok(Box::new(Self {
            config: Arc::clone(&services.config),
            scroll: 0,
        }))
    }

    fn lines(&self) -> Vec<Line<'static>> {
        let label = Style::default().fg(Color::Cyan);
        let section = Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::BOLD);
        let row = |name: &str, value: String| {
            Line::from(vec![
                Span::styled(format!("  {name:<16}"), label),
                Span::raw(value),
            ])
        };

        let config_path = self
            .config
            .config_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(none)".to_string());

        let mut lines = vec![
            Line::from(Span::styled("General", section)),
            row("config file", config_path),
            row(
                "projects dir",
                self.config.projects_dir.display().to_string(),
            ),
            row("claude binary", self.config.claude_bin.clone()),
            row(
                "watch debounce",
                format!("{} ms", self.config.watch_debounce.as_millis()),
            ),
            row(
                "toast duration",
                format!("{} ms", self.config.toast_duration.as_millis()),
            ),
            Line::raw(""),
            Line::from(Span::styled("Key bindings", section)),
        ];

        let keys = &self.config.keybindings;
        lines.extend(
            keys.actions()
                .into_iter()
                .map(|action| row(action, keys.describe(action))),
        );
        lines
    }
}

#[async_trait]
impl Page for SettingsPage {
    fn kind(&self) -> PageKind {
        PageKind::Settings
    }

    fn title(&self) -> String {
        "Settings".to_string()
    }

    fn render_body(&mut self, f: &mut Frame, area: Rect) -> Result<()> {
        let lines = self.lines();
        let max_scroll = u16::try_from(lines.len())
            .unwrap_or(u16::MAX)
            .saturating_sub(area.height.saturating_sub(2));
        self.scroll = self.scroll.min(max_scroll);

        let body = Paragraph::new(lines)
            .scroll((self.scroll, 0))
            .block(Block::default().borders(Borders::ALL));
        f.render_widget(body, area);
        Ok(())
    }

    fn key_hints(&self) -> Vec<(&'static str, &'static str)> {
        vec![("↑/↓", "scroll"), ("Esc", "back"), ("q", "back")]
    }

    async fn handle_key(&mut self, key: KeyEvent, _ctx: &PageContext) -> Result<bool> {
        let keys = &self.config.keybindings;
        if keys.matches("up", &key) {
            self.scroll = self.scroll.saturating_sub(1);
        } else if keys.matches("down", &key) {
            self.scroll = self.scroll.saturating_add(1);
        } else if keys.matches("top", &key) {
            self.scroll = 0;
        } else {
            return Ok(false);
        }
        Ok(true)
    }
}
