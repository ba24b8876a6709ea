//! The one input buffer shared by typed and voice input
//!
//! Note: `cursor` is a CHARACTER index, not a byte index.
//!
//! Every time the buffer is submitted it is cleared and its generation bumps,
//! so a signal that refers to an earlier generation can be recognized as
//! stale.

use unicode_width::UnicodeWidthChar;

/// An edit to the input buffer
#[derive(Debug, Clone, PartialEq)]
pub enum InputEdit {
    Insert(char),
    /// Insert a whole string at the cursor (paste)
    InsertStr(String),
    Backspace,
    Delete,
    DeleteWord,
    Clear,
    CursorLeft,
    CursorRight,
    CursorHome,
    CursorEnd,
    /// Replace the whole buffer (live voice transcript)
    Replace(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct InputBuffer {
    text: String,
    cursor: usize,
    generation: u64,
}

impl InputBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Nothing but whitespace
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    fn char_count(&self) -> usize {
        self.text.chars().count()
    }

    fn char_to_byte_index(&self, char_idx: usize) -> usize {
        self.text
            .char_indices()
            .nth(char_idx)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.text.len())
    }

    pub fn apply(&mut self, edit: InputEdit) {
        match edit {
            InputEdit::Insert(c) => self.insert_char(c),
            InputEdit::InsertStr(s) => {
                for c in s.chars().filter(|c| *c != '\r') {
                    self.insert_char(if c == '\n' { ' ' } else { c });
                }
            }
            InputEdit::Backspace => self.remove_char_before_cursor(),
            InputEdit::Delete => self.remove_char_at_cursor(),
            InputEdit::DeleteWord => self.delete_word(),
            InputEdit::Clear => {
                self.text.clear();
                self.cursor = 0;
            }
            InputEdit::CursorLeft => self.cursor = self.cursor.saturating_sub(1),
            InputEdit::CursorRight => {
                if self.cursor < self.char_count() {
                    self.cursor += 1;
                }
            }
            InputEdit::CursorHome => self.cursor = 0,
            InputEdit::CursorEnd => self.cursor = self.char_count(),
            InputEdit::Replace(text) => {
                self.text = text;
                self.cursor = self.char_count();
            }
        }
    }

    fn insert_char(&mut self, c: char) {
        let byte_idx = self.char_to_byte_index(self.cursor);
        self.text.insert(byte_idx, c);
        self.cursor += 1;
    }

    fn remove_char_before_cursor(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            self.remove_char_at_cursor();
        }
    }

    fn remove_char_at_cursor(&mut self) {
        let byte_idx = self.char_to_byte_index(self.cursor);
        if let Some(ch) = self.text[byte_idx..].chars().next() {
            self.text.replace_range(byte_idx..byte_idx + ch.len_utf8(), "");
        }
    }

    fn delete_word(&mut self) {
        let chars: Vec<char> = self.text.chars().collect();
        let mut start = self.cursor.min(chars.len());
        while start > 0 && chars[start - 1] == ' ' {
            start -= 1;
        }
        while start > 0 && chars[start - 1] != ' ' {
            start -= 1;
        }
        let from = self.char_to_byte_index(start);
        let to = self.char_to_byte_index(self.cursor);
        self.text.replace_range(from..to, "");
        self.cursor = start;
    }

    /// Take the buffered text for submission. Clears the buffer and starts a
    /// new generation. Returns `None` for a blank buffer, which is left as-is.
    pub fn take(&mut self) -> Option<String> {
        if self.is_blank() {
            return None;
        }
        let text = std::mem::take(&mut self.text).trim().to_string();
        self.cursor = 0;
        self.generation += 1;
        Some(text)
    }

    /// Cursor position in terminal columns
    pub fn cursor_display_width(&self) -> usize {
        self.text
            .chars()
            .take(self.cursor)
            .map(|c| c.width().unwrap_or(0))
            .sum()
    }
}
