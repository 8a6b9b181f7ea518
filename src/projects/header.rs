use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use unicode_width::UnicodeWidthChar;

use crate::error::Result;

const PREVIEW_MAX_WIDTH: usize = 120;

/// Fields of a session transcript line that the index and loader care about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionHeader {
    pub session_id: Option<String>,
    pub cwd: Option<PathBuf>,
    pub timestamp: Option<DateTime<Utc>>,
    pub branch: Option<String>,
    pub line_type: Option<String>,
    /// Summary text of `{"type":"summary"}` lines
    pub summary: Option<String>,
    pub preview: Option<String>,
}

impl SessionHeader {
    pub fn is_summary(&self) -> bool {
        self.line_type.as_deref() == Some("summary")
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLine {
    session_id: Option<String>,
    cwd: Option<String>,
    timestamp: Option<String>,
    git_branch: Option<String>,
    #[serde(rename = "type")]
    line_type: Option<String>,
    summary: Option<String>,
    message: Option<serde_json::Value>,
}

/// Parse one JSON line of a session file.
pub fn parse_header_line(line: &str) -> Result<SessionHeader> {
    let raw: RawLine = serde_json::from_str(line.trim())?;

    let timestamp = raw
        .timestamp
        .as_deref()
        .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
        .map(|ts| ts.with_timezone(&Utc));

    let preview = raw
        .message
        .as_ref()
        .and_then(message_text)
        .map(|text| single_line_preview(&text, PREVIEW_MAX_WIDTH))
        .filter(|text| !text.is_empty());

    Ok(SessionHeader {
        session_id: raw.session_id.filter(|id| !id.trim().is_empty()),
        cwd: raw.cwd.filter(|c| !c.is_empty()).map(PathBuf::from),
        timestamp,
        branch: raw.git_branch.filter(|b| !b.is_empty()),
        line_type: raw.line_type,
        summary: raw.summary,
        preview,
    })
}

fn message_text(message: &serde_json::Value) -> Option<String> {
    let content = message.get("content").unwrap_or(message);
    match content {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Array(blocks) => blocks.iter().find_map(|block| {
            if block.get("type").and_then(|t| t.as_str()) == Some("text") {
                block.get("text").and_then(|t| t.as_str()).map(str::to_string)
            } else {
                None
            }
        }),
        _ => None,
    }
}

/// Collapse whitespace and cut to `max_width` terminal columns.
pub(crate) fn single_line_preview(text: &str, max_width: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let mut out = String::new();
    let mut width = 0;
    for ch in collapsed.chars() {
        let w = ch.width().unwrap_or(0);
        if width + w > max_width {
            out.push('…');
            break;
        }
        width += w;
        out.push(ch);
    }
    out
}
