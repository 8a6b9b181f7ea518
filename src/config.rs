use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use serde::Deserialize;
use tokio::fs;

use crate::error::{Error, Result};

const CONFIG_DIR: &str = ".claude-deck";
const CONFIG_FILE: &str = "config.json";
const DEFAULT_CLAUDE_BIN: &str = "claude";
const DEFAULT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_TOAST_MS: u64 = 3000;
const MAX_DEBOUNCE_MS: u64 = 60_000;
const MAX_TOAST_MS: u64 = 600_000;

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// On-disk configuration (`~/.claude-deck/config.json`); every field is optional.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
    #[serde(default)]
    projects_dir: Option<PathBuf>,
    #[serde(default)]
    claude_bin: Option<String>,
    #[serde(default)]
    watch_debounce_ms: Option<u64>,
    #[serde(default)]
    toast_duration_ms: Option<u64>,
    #[serde(default)]
    keybindings: HashMap<String, OneOrMany>,
}

impl ConfigFile {
    /// Base directory for config and logs
    pub fn base_dir() -> Result<PathBuf> {
        let home =
            dirs::home_dir().ok_or_else(|| Error::config("Cannot determine home directory"))?;
        Ok(home.join(CONFIG_DIR))
    }

    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join(CONFIG_FILE))
    }

    /// Missing file → `Ok(None)`; malformed file → error.
    pub async fn load_from(path: &Path) -> Result<Option<Self>> {
        let content = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(_) => return Ok(None),
        };
        let cfg = serde_json::from_str::<Self>(&content)
            .map_err(|e| Error::config(format!("{}: {}", path.display(), e)))?;
        Ok(Some(cfg))
    }
}

/// Values taken from CLI flags / environment, which win over the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub projects_dir: Option<PathBuf>,
    pub claude_bin: Option<String>,
    pub config_path: Option<PathBuf>,
}

/// Resolved configuration, read once at startup and never changed afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub projects_dir: PathBuf,
    pub claude_bin: String,
    pub watch_debounce: Duration,
    pub toast_duration: Duration,
    pub keybindings: KeyBindings,
    pub config_path: Option<PathBuf>,
}

impl AppConfig {
    pub async fn load(overrides: ConfigOverrides) -> Result<Self> {
        let path = match overrides.config_path.clone() {
            Some(p) => Some(p),
            None => ConfigFile::default_path().ok(),
        };
        let file = match &path {
            Some(p) => ConfigFile::load_from(p).await?,
            None => None,
        };
        let mut config = Self::resolve(file.unwrap_or_default(), overrides)?;
        config.config_path = path;
        Ok(config)
    }

    pub fn resolve(file: ConfigFile, overrides: ConfigOverrides) -> Result<Self> {
        let projects_dir = match overrides.projects_dir.or(file.projects_dir) {
            Some(dir) => expand_home(&dir),
            None => default_projects_dir()?,
        };

        let claude_bin = overrides
            .claude_bin
            .or(file.claude_bin)
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CLAUDE_BIN.to_string());

        let mut keybindings = KeyBindings::default();
        keybindings.apply_overrides(file.keybindings);

        Ok(Self {
            projects_dir,
            claude_bin,
            watch_debounce: Duration::from_millis(
                file.watch_debounce_ms
                    .unwrap_or(DEFAULT_DEBOUNCE_MS)
                    .min(MAX_DEBOUNCE_MS),
            ),
            toast_duration: Duration::from_millis(
                file.toast_duration_ms
                    .unwrap_or(DEFAULT_TOAST_MS)
                    .min(MAX_TOAST_MS),
            ),
            keybindings,
            config_path: None,
        })
    }
}

fn default_projects_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| Error::config("Cannot determine home directory"))?;
    Ok(home.join(".claude").join("projects"))
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), dirs::home_dir()) {
        (Ok(rest), Some(home)) => home.join(rest),
        _ => path.to_path_buf(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeySpec {
    pub code: KeyCode,
    pub modifiers: KeyModifiers,
}

impl KeySpec {
    const fn plain(code: KeyCode) -> Self {
        Self {
            code,
            modifiers: KeyModifiers::NONE,
        }
    }

    const fn ctrl(c: char) -> Self {
        Self {
            code: KeyCode::Char(c),
            modifiers: KeyModifiers::CONTROL,
        }
    }
}

/// Global shortcuts and list navigation keys, by action name.
#[derive(Debug, Clone)]
pub struct KeyBindings {
    bindings: HashMap<&'static str, Vec<KeySpec>>,
}

impl Default for KeyBindings {
    fn default() -> Self {
        use KeyCode::*;

        let mut kb = Self {
            bindings: HashMap::new(),
        };

        kb.bindings.insert("quit", vec![KeySpec::plain(Char('q'))]);
        kb.bindings.insert("exit", vec![KeySpec::ctrl('c')]);
        kb.bindings.insert("back", vec![KeySpec::plain(Esc)]);
        kb.bindings.insert("settings", vec![KeySpec::plain(Char('s'))]);
        kb.bindings.insert("refresh", vec![KeySpec::ctrl('r')]);
        kb.bindings
            .insert("clear_toasts", vec![KeySpec::plain(Char('x'))]);

        kb.bindings.insert(
            "up",
            vec![KeySpec::plain(Up), KeySpec::plain(Char('k'))],
        );
        kb.bindings.insert(
            "down",
            vec![KeySpec::plain(Down), KeySpec::plain(Char('j'))],
        );
        kb.bindings.insert("page_up", vec![KeySpec::plain(PageUp)]);
        kb.bindings.insert("page_down", vec![KeySpec::plain(PageDown)]);
        kb.bindings.insert("top", vec![KeySpec::plain(Home)]);
        kb.bindings.insert("bottom", vec![KeySpec::plain(End)]);
        kb.bindings.insert("select", vec![KeySpec::plain(Enter)]);
        kb.bindings.insert(
            "search",
            vec![KeySpec::plain(Char('/')), KeySpec::plain(Char('f'))],
        );
        kb.bindings.insert("new_session", vec![KeySpec::plain(Char('n'))]);

        kb
    }
}

impl KeyBindings {
    fn apply_overrides(&mut self, overrides: HashMap<String, OneOrMany>) {
        for (action, spec) in overrides {
            let parsed: Vec<KeySpec> = spec
                .into_vec()
                .iter()
                .filter_map(|s| parse_key_spec(s))
                .collect();
            if parsed.is_empty() {
                continue;
            }
            if let Some(slot) = self.bindings.get_mut(action.as_str()) {
                *slot = parsed;
            }
        }
    }

    /// SHIFT is ignored for character keys, since terminals disagree on reporting it.
    pub fn matches(&self, action: &'static str, key: &KeyEvent) -> bool {
        let modifiers = match key.code {
            KeyCode::Char(_) => key.modifiers.difference(KeyModifiers::SHIFT),
            _ => key.modifiers,
        };
        self.bindings
            .get(action)
            .is_some_and(|v| v.iter().any(|k| k.code == key.code && k.modifiers == modifiers))
    }

    /// Human-readable key list for an action, e.g. `"Up/k"`.
    pub fn describe(&self, action: &'static str) -> String {
        self.bindings
            .get(action)
            .map(|specs| {
                specs
                    .iter()
                    .map(describe_key)
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default()
    }

    pub fn actions(&self) -> Vec<&'static str> {
        let mut actions: Vec<_> = self.bindings.keys().copied().collect();
        actions.sort_unstable();
        actions
    }
}

fn describe_key(spec: &KeySpec) -> String {
    let key = match spec.code {
        KeyCode::Char(' ') => "Space".to_string(),
        KeyCode::Char(c) => c.to_string(),
        KeyCode::Enter => "Enter".to_string(),
        KeyCode::Esc => "Esc".to_string(),
        KeyCode::PageUp => "PgUp".to_string(),
        KeyCode::PageDown => "PgDn".to_string(),
        other => format!("{:?}", other),
    };
    if spec.modifiers.contains(KeyModifiers::CONTROL) {
        format!("Ctrl+{key}")
    } else if spec.modifiers.contains(KeyModifiers::ALT) {
        format!("Alt+{key}")
    } else {
        key
    }
}

fn parse_key_spec(s: &str) -> Option<KeySpec> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    let mut modifiers = KeyModifiers::NONE;
    let parts: Vec<&str> = s.split('+').map(|p| p.trim()).collect();
    let (mods, key_part) = match parts.split_last() {
        Some((key, mods)) => (mods, *key),
        None => return None,
    };

    for m in mods {
        match m.to_lowercase().as_str() {
            "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
            "alt" => modifiers |= KeyModifiers::ALT,
            _ => return None,
        }
    }

    let code = match key_part.to_lowercase().as_str() {
        "enter" => KeyCode::Enter,
        "esc" | "escape" => KeyCode::Esc,
        "tab" => KeyCode::Tab,
        "backspace" => KeyCode::Backspace,
        "space" => KeyCode::Char(' '),
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "pageup" | "pgup" => KeyCode::PageUp,
        "pagedown" | "pgdn" => KeyCode::PageDown,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        _ => {
            let mut chars = key_part.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => KeyCode::Char(c),
                _ => return None,
            }
        }
    };

    Some(KeySpec { code, modifiers })
}
