//! Single-line text entry for the credentials form.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// A text input with a cursor. Secret inputs display as `*`.
#[derive(Debug, Clone)]
pub struct InputField {
    value: String,
    /// Cursor position (byte index).
    cursor: usize,
    pub label: String,
    secret: bool,
}

impl InputField {
    pub fn new(value: impl Into<String>, label: &str) -> Self {
        let value = value.into();
        Self {
            cursor: value.len(),
            value,
            label: label.to_string(),
            secret: false,
        }
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The value as it should be drawn.
    pub fn display(&self) -> String {
        if self.secret {
            "*".repeat(self.value.chars().count())
        } else {
            self.value.clone()
        }
    }

    /// Apply an editing key. Returns true if the key was consumed.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('u') if ctrl => {
                self.value.clear();
                self.cursor = 0;
                true
            }
            KeyCode::Char('a') if ctrl => {
                self.cursor = 0;
                true
            }
            KeyCode::Char('e') if ctrl => {
                self.cursor = self.value.len();
                true
            }
            KeyCode::Char(_) if ctrl => false,
            KeyCode::Char(c) => {
                self.value.insert(self.cursor, c);
                self.cursor += c.len_utf8();
                true
            }
            KeyCode::Backspace => {
                if let Some(prev) = self.prev_boundary() {
                    self.value.remove(prev);
                    self.cursor = prev;
                }
                true
            }
            KeyCode::Delete => {
                if self.cursor < self.value.len() {
                    self.value.remove(self.cursor);
                }
                true
            }
            KeyCode::Left => {
                if let Some(prev) = self.prev_boundary() {
                    self.cursor = prev;
                }
                true
            }
            KeyCode::Right => {
                if let Some(c) = self.value[self.cursor..].chars().next() {
                    self.cursor += c.len_utf8();
                }
                true
            }
            KeyCode::Home => {
                self.cursor = 0;
                true
            }
            KeyCode::End => {
                self.cursor = self.value.len();
                true
            }
            _ => false,
        }
    }

    fn prev_boundary(&self) -> Option<usize> {
        self.value[..self.cursor]
            .char_indices()
            .last()
            .map(|(i, _)| i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyEventKind, KeyEventState};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent {
            code,
            modifiers: KeyModifiers::NONE,
            kind: KeyEventKind::Press,
            state: KeyEventState::NONE,
        }
    }

    #[test]
    fn edits_at_the_cursor() {
        let mut field = InputField::new("hello", "SSID");
        assert_eq!(field.cursor(), 5);

        field.handle_key(key(KeyCode::Left));
        field.handle_key(key(KeyCode::Char('!')));
        assert_eq!(field.value(), "hell!o");

        field.handle_key(key(KeyCode::Backspace));
        field.handle_key(key(KeyCode::Home));
        field.handle_key(key(KeyCode::Delete));
        assert_eq!(field.value(), "ello");
        assert_eq!(field.cursor(), 0);
    }

    #[test]
    fn multibyte_characters_move_as_one() {
        let mut field = InputField::new("café", "SSID");
        field.handle_key(key(KeyCode::Backspace));
        assert_eq!(field.value(), "caf");
        field.handle_key(key(KeyCode::Char('é')));
        field.handle_key(key(KeyCode::Left));
        assert_eq!(field.cursor(), 3);
        field.handle_key(key(KeyCode::Right));
        assert_eq!(field.cursor(), 5);
    }

    #[test]
    fn control_keys_do_not_insert() {
        let mut field = InputField::new("secret", "Password").secret();
        assert_eq!(field.display(), "******");

        let ctrl_x = KeyEvent {
            modifiers: KeyModifiers::CONTROL,
            ..key(KeyCode::Char('x'))
        };
        assert!(!field.handle_key(ctrl_x));
        assert_eq!(field.value(), "secret");

        let ctrl_u = KeyEvent {
            modifiers: KeyModifiers::CONTROL,
            ..key(KeyCode::Char('u'))
        };
        assert!(field.handle_key(ctrl_u));
        assert_eq!(field.value(), "");
    }
}
