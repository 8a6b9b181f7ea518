use chrono::{DateTime, Utc};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph, Wrap},
    Frame,
};

use crate::runtime::{ActiveToast, Severity};

/// Split the screen into header, body and footer.
pub fn frame_layout(area: Rect) -> [Rect; 3] {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title
            Constraint::Min(0),    // Content
            Constraint::Length(3), // Key hints
        ])
        .split(area);
    [chunks[0], chunks[1], chunks[2]]
}

/// Render title bar
pub fn title_bar(f: &mut Frame, area: Rect, title: &str, subtitle: Option<&str>) {
    let mut spans = vec![Span::styled(
        title.to_string(),
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD),
    )];
    if let Some(sub) = subtitle {
        spans.push(Span::raw("  "));
        spans.push(Span::styled(
            sub.to_string(),
            Style::default().fg(Color::DarkGray),
        ));
    }

    let header = Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(header, area);
}

pub fn key_hints(f: &mut Frame, area: Rect, hints: &[(&str, &str)]) {
    let mut spans = vec![Span::raw(" ")];
    for (key, label) in hints {
        spans.push(Span::styled(
            key.to_string(),
            Style::default().fg(Color::Cyan),
        ));
        spans.push(Span::raw(format!(":{label}  ")));
    }

    let bar = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(bar, area);
}

/// Stand-in for a fragment whose render failed.
pub fn error_placeholder(f: &mut Frame, area: Rect, fragment: &str, message: &str) {
    let text = Paragraph::new(format!("{fragment} unavailable: {message}"))
        .style(Style::default().fg(Color::Red))
        .wrap(Wrap { trim: true })
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(text, area);
}

pub fn empty_state(f: &mut Frame, area: Rect, title: &str, message: &str) {
    let empty = Paragraph::new(message.to_string())
        .style(Style::default().fg(Color::DarkGray))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(title.to_string()),
        );
    f.render_widget(empty, area);
}

fn severity_color(severity: Severity) -> Color {
    match severity {
        Severity::Info => Color::Cyan,
        Severity::Success => Color::Green,
        Severity::Warning => Color::Yellow,
        Severity::Error => Color::Red,
    }
}

/// Message plus borders, at least 20 columns, never wider than the area.
fn toast_width(message: &str, available: u16) -> u16 {
    u16::try_from(message.chars().count())
        .unwrap_or(u16::MAX)
        .saturating_add(4)
        .clamp(20, available.saturating_sub(2).max(20))
        .min(available)
}

/// Draw the visible toast in the bottom-right corner of `area`.
pub fn toast_overlay(f: &mut Frame, area: Rect, toast: &ActiveToast) {
    let width = toast_width(&toast.toast.message, area.width);
    let height = 3.min(area.height);
    let rect = Rect {
        x: area.x + area.width.saturating_sub(width.saturating_add(1)),
        y: area.y + area.height.saturating_sub(height + 3),
        width,
        height,
    };

    let color = severity_color(toast.toast.severity);
    let widget = Paragraph::new(toast.toast.message.clone())
        .style(Style::default().fg(color))
        .wrap(Wrap { trim: true })
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color)),
        );

    f.render_widget(Clear, rect);
    f.render_widget(widget, rect);
}

/// "3m ago" style age of a timestamp.
pub fn relative_time(ts: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(ts) = ts else {
        return "-".to_string();
    };
    let secs = (now - ts).num_seconds().max(0);
    match secs {
        0..=59 => "just now".to_string(),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        86_400..=2_591_999 => format!("{}d ago", secs / 86_400),
        _ => ts.format("%Y-%m-%d").to_string(),
    }
}

/// Keep `selected` inside `[0, len)`.
pub fn clamp_selection(selected: usize, len: usize) -> usize {
    if len == 0 {
        0
    } else {
        selected.min(len - 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_relative_time() {
        let now = Utc::now();
        assert_eq!(relative_time(None, now), "-");
        assert_eq!(relative_time(Some(now), now), "just now");
        assert_eq!(relative_time(Some(now - Duration::minutes(5)), now), "5m ago");
        assert_eq!(relative_time(Some(now - Duration::hours(3)), now), "3h ago");
        assert_eq!(relative_time(Some(now - Duration::days(2)), now), "2d ago");
    }

    #[test]
    fn test_clamp_selection() {
        assert_eq!(clamp_selection(5, 0), 0);
        assert_eq!(clamp_selection(5, 3), 2);
        assert_eq!(clamp_selection(1, 3), 1);
    }

    #[test]
    fn test_toast_width_bounds() {
        assert_eq!(toast_width("hi", 80), 20);
        assert_eq!(toast_width("a somewhat longer message", 80), 29);
        assert_eq!(toast_width(&"x".repeat(70_000), 80), 78);
        assert_eq!(toast_width("hi", 10), 10);
    }
}
