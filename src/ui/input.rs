use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Single-line query box used by list filters
#[derive(Debug, Clone, Default)]
pub struct SearchInput {
    text: String,
    /// Cursor position (byte index)
    cursor: usize,
    active: bool,
}

/// What a key did to the search box
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchEdit {
    Changed,
    Moved,
    Confirmed,
    Cancelled,
    Ignored,
}

impl SearchInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn open(&mut self) {
        self.active = true;
    }

    /// Stop editing but keep the query applied.
    pub fn close(&mut self) {
        self.active = false;
    }

    /// Stop editing and drop the query.
    pub fn reset(&mut self) {
        self.text.clear();
        self.cursor = 0;
        self.active = false;
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }

    /// Case-insensitive substring match; an empty query matches everything.
    pub fn matches(&self, haystack: &str) -> bool {
        let query = self.text.trim();
        query.is_empty() || haystack.to_lowercase().contains(&query.to_lowercase())
    }

    /// Cursor position in characters (for display)
    pub fn cursor_char_pos(&self) -> usize {
        self.text[..self.cursor].chars().count()
    }

    pub fn handle_key(&mut self, key: &KeyEvent) -> SearchEdit {
        match key.code {
            KeyCode::Esc => {
                self.reset();
                SearchEdit::Cancelled
            }
            KeyCode::Enter => {
                self.close();
                SearchEdit::Confirmed
            }
            KeyCode::Backspace => {
                self.backspace();
                SearchEdit::Changed
            }
            KeyCode::Left => {
                self.move_left();
                SearchEdit::Moved
            }
            KeyCode::Right => {
                self.move_right();
                SearchEdit::Moved
            }
            KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.insert(ch);
                SearchEdit::Changed
            }
            _ => SearchEdit::Ignored,
        }
    }

    fn insert(&mut self, ch: char) {
        self.text.insert(self.cursor, ch);
        self.cursor += ch.len_utf8();
    }

    fn backspace(&mut self) {
        if self.cursor > 0 {
            let prev = self.text[..self.cursor]
                .char_indices()
                .last()
                .map(|(i, _)| i)
                .unwrap_or(0);
            self.text.remove(prev);
            self.cursor = prev;
        }
    }

    fn move_left(&mut self) {
        if self.cursor > 0 {
            self.cursor = self.text[..self.cursor]
                .char_indices()
                .last()
                .map(|(i, _)| i)
                .unwrap_or(0);
        }
    }

    fn move_right(&mut self) {
        if self.cursor < self.text.len() {
            self.cursor = self.text[self.cursor..]
                .char_indices()
                .nth(1)
                .map(|(i, _)| self.cursor + i)
                .unwrap_or(self.text.len());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(input: &mut SearchInput, code: KeyCode) -> SearchEdit {
        input.handle_key(&KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn test_editing() {
        let mut input = SearchInput::new();
        input.open();
        for ch in "abc".chars() {
            press(&mut input, KeyCode::Char(ch));
        }
        assert_eq!(input.text(), "abc");

        press(&mut input, KeyCode::Backspace);
        press(&mut input, KeyCode::Left);
        press(&mut input, KeyCode::Char('x'));
        assert_eq!(input.text(), "axb");
        assert_eq!(input.cursor_char_pos(), 2);

        assert_eq!(press(&mut input, KeyCode::Enter), SearchEdit::Confirmed);
        assert!(!input.is_active());
        assert_eq!(input.text(), "axb");

        input.open();
        assert_eq!(press(&mut input, KeyCode::Esc), SearchEdit::Cancelled);
        assert!(input.is_empty());
    }

    #[test]
    fn test_unicode_cursor() {
        let mut input = SearchInput::new();
        press(&mut input, KeyCode::Char('你'));
        press(&mut input, KeyCode::Char('好'));
        press(&mut input, KeyCode::Left);
        assert_eq!(input.cursor_char_pos(), 1);
        press(&mut input, KeyCode::Char('世'));
        assert_eq!(input.text(), "你世好");
    }

    #[test]
    fn test_case_insensitive_match() {
        let mut input = SearchInput::new();
        press(&mut input, KeyCode::Char('B'));
        assert!(input.matches("beta"));
        assert!(!input.matches("alpha"));
        input.reset();
        assert!(input.matches("alpha"));
    }
}
