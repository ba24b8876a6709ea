//! Key bindings
//!
//! Maps a key press to an action for the surface that has focus. The app
//! decides what each action means for the conversation.

use crate::input::InputEdit;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Which surface receives keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Free-text input line
    Chat,
    /// Decision surface for a pending interrupt
    Decision,
    /// Edit-and-approve form
    Form,
    /// Free-text feedback for a pending interrupt
    Feedback,
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyAction {
    None,
    /// Ctrl+C
    Quit,
    /// Esc while the agent is busy
    Stop,
    Submit,
    Edit(InputEdit),
    ScrollUp(u16),
    ScrollDown(u16),
    ToggleVoice,
    Approve,
    /// Let the tool call go ahead as proposed without an approval verdict
    Continue,
    Cancel,
    OpenForm,
    OpenFeedback,
    /// Leave the form or feedback line without deciding
    Close,
    NextField,
    PrevField,
    /// Step a choice field forward (`true`) or back
    Cycle(bool),
    FormChar(char),
    FormBackspace,
}

fn ctrl(key: &KeyEvent, c: char) -> bool {
    key.code == KeyCode::Char(c) && key.modifiers.contains(KeyModifiers::CONTROL)
}

/// Line editing shared by the chat and feedback inputs
fn edit_key(key: &KeyEvent) -> Option<InputEdit> {
    if key.modifiers.contains(KeyModifiers::CONTROL) {
        return match key.code {
            KeyCode::Char('u') => Some(InputEdit::Clear),
            KeyCode::Char('w') => Some(InputEdit::DeleteWord),
            KeyCode::Char('a') => Some(InputEdit::CursorHome),
            KeyCode::Char('e') => Some(InputEdit::CursorEnd),
            _ => None,
        };
    }
    match key.code {
        KeyCode::Char(c) => Some(InputEdit::Insert(c)),
        KeyCode::Backspace => Some(InputEdit::Backspace),
        KeyCode::Delete => Some(InputEdit::Delete),
        KeyCode::Left => Some(InputEdit::CursorLeft),
        KeyCode::Right => Some(InputEdit::CursorRight),
        KeyCode::Home => Some(InputEdit::CursorHome),
        KeyCode::End => Some(InputEdit::CursorEnd),
        _ => None,
    }
}

pub fn map_key(mode: Mode, key: KeyEvent) -> KeyAction {
    if ctrl(&key, 'c') {
        return KeyAction::Quit;
    }
    match key.code {
        KeyCode::PageUp => return KeyAction::ScrollUp(5),
        KeyCode::PageDown => return KeyAction::ScrollDown(5),
        _ => {}
    }

    match mode {
        Mode::Chat => match key.code {
            KeyCode::Enter => KeyAction::Submit,
            KeyCode::Esc => KeyAction::Stop,
            KeyCode::Up => KeyAction::ScrollUp(1),
            KeyCode::Down => KeyAction::ScrollDown(1),
            _ if ctrl(&key, 'v') => KeyAction::ToggleVoice,
            _ => edit_key(&key).map_or(KeyAction::None, KeyAction::Edit),
        },
        Mode::Decision => match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') | KeyCode::Enter => KeyAction::Approve,
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => KeyAction::Cancel,
            KeyCode::Char('e') | KeyCode::Char('E') => KeyAction::OpenForm,
            KeyCode::Char('f') | KeyCode::Char('F') => KeyAction::OpenFeedback,
            KeyCode::Char('c') | KeyCode::Char('C') => KeyAction::Continue,
            KeyCode::Up => KeyAction::ScrollUp(1),
            KeyCode::Down => KeyAction::ScrollDown(1),
            _ => KeyAction::None,
        },
        Mode::Form => match key.code {
            KeyCode::Enter => KeyAction::Submit,
            KeyCode::Esc => KeyAction::Close,
            KeyCode::Tab | KeyCode::Down => KeyAction::NextField,
            KeyCode::BackTab | KeyCode::Up => KeyAction::PrevField,
            KeyCode::Left => KeyAction::Cycle(false),
            KeyCode::Right => KeyAction::Cycle(true),
            KeyCode::Backspace => KeyAction::FormBackspace,
            KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
                KeyAction::FormChar(c)
            }
            _ => KeyAction::None,
        },
        Mode::Feedback => match key.code {
            KeyCode::Enter => KeyAction::Submit,
            KeyCode::Esc => KeyAction::Close,
            _ => edit_key(&key).map_or(KeyAction::None, KeyAction::Edit),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl_key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn test_decision_keys() {
        assert_eq!(map_key(Mode::Decision, key(KeyCode::Char('y'))), KeyAction::Approve);
        assert_eq!(map_key(Mode::Decision, key(KeyCode::Esc)), KeyAction::Cancel);
        assert_eq!(map_key(Mode::Decision, key(KeyCode::Char('e'))), KeyAction::OpenForm);
        assert_eq!(map_key(Mode::Decision, key(KeyCode::Char('f'))), KeyAction::OpenFeedback);
        assert_eq!(map_key(Mode::Decision, key(KeyCode::Char('c'))), KeyAction::Continue);
        assert_eq!(map_key(Mode::Decision, key(KeyCode::Char('x'))), KeyAction::None);
    }

    #[test]
    fn test_chat_keys() {
        assert_eq!(
            map_key(Mode::Chat, key(KeyCode::Char('y'))),
            KeyAction::Edit(InputEdit::Insert('y'))
        );
        assert_eq!(map_key(Mode::Chat, key(KeyCode::Esc)), KeyAction::Stop);
        assert_eq!(map_key(Mode::Chat, ctrl_key('w')), KeyAction::Edit(InputEdit::DeleteWord));
        assert_eq!(map_key(Mode::Chat, ctrl_key('v')), KeyAction::ToggleVoice);
        assert_eq!(map_key(Mode::Chat, ctrl_key('c')), KeyAction::Quit);
    }

    #[test]
    fn test_form_keys() {
        assert_eq!(map_key(Mode::Form, key(KeyCode::Tab)), KeyAction::NextField);
        assert_eq!(map_key(Mode::Form, key(KeyCode::Right)), KeyAction::Cycle(true));
        assert_eq!(map_key(Mode::Form, key(KeyCode::Char('4'))), KeyAction::FormChar('4'));
        assert_eq!(map_key(Mode::Form, key(KeyCode::Esc)), KeyAction::Close);
        assert_eq!(map_key(Mode::Form, ctrl_key('c')), KeyAction::Quit);
    }
}
