use std::time::Duration;

use tracing::trace;

use ratatui::crossterm::event::{self, Event, KeyCode, MouseButton, MouseEventKind};

use crate::domain::{Message, TdvError, ViewerConfig};
use crate::model::ViewerModel;

/// Polls terminal events and maps them to semantic [`Message`]s. While a
/// text input is active, keystrokes are forwarded raw instead.
pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(config: &ViewerConfig) -> Self {
        Self {
            event_poll_time: config.event_poll_ms,
        }
    }

    pub fn handle_event(&self, model: &ViewerModel) -> Result<Option<Message>, TdvError> {
        if !event::poll(Duration::from_millis(self.event_poll_time))? {
            return Ok(None);
        }
        let message = match event::read()? {
            Event::Key(key) if key.kind == event::KeyEventKind::Press => self.map_key(model, key),
            Event::Mouse(mouse) => Self::map_mouse(mouse),
            Event::Resize(width, height) => Some(Message::Resize(width as usize, height as usize)),
            _ => None,
        };
        Ok(message)
    }

    fn map_key(&self, model: &ViewerModel, key: event::KeyEvent) -> Option<Message> {
        if model.raw_keyevents() {
            return Some(Message::RawKey(key));
        }
        let page = model.body_height().max(1);
        let message = match key.code {
            KeyCode::Char('q') => Some(Message::Quit),
            KeyCode::Up | KeyCode::Char('k') => Some(Message::MoveUp(1)),
            KeyCode::Down | KeyCode::Char('j') => Some(Message::MoveDown(1)),
            KeyCode::Left | KeyCode::Char('h') => Some(Message::MoveLeft),
            KeyCode::Right | KeyCode::Char('l') => Some(Message::MoveRight),
            KeyCode::PageUp => Some(Message::MoveUp(page)),
            KeyCode::PageDown => Some(Message::MoveDown(page)),
            KeyCode::Char('g') | KeyCode::Home => Some(Message::MoveTop),
            KeyCode::Char('G') | KeyCode::End => Some(Message::MoveBottom),
            KeyCode::Char('/') | KeyCode::Char('e') => Some(Message::EditFilter),
            KeyCode::Char('s') => Some(Message::ToggleSort),
            KeyCode::Char('i') => Some(Message::ToggleCaseInsensitive),
            KeyCode::Char('r') => Some(Message::ToggleRegex),
            KeyCode::Char('C') => Some(Message::ClearFilters),
            KeyCode::Char('t') => Some(Message::ShowColumnStats),
            KeyCode::Char('v') => Some(Message::ShowValueFilter),
            KeyCode::Char('R') => Some(Message::Refresh),
            KeyCode::Char('<') => Some(Message::ShrinkColumn),
            KeyCode::Char('>') => Some(Message::GrowColumn),
            KeyCode::Char('y') => Some(Message::CopyJson),
            KeyCode::Char('a') => Some(Message::SelectAll),
            KeyCode::Char('n') => Some(Message::SelectNone),
            KeyCode::Char(' ') => Some(Message::ToggleValue),
            KeyCode::Char('?') => Some(Message::Help),
            KeyCode::Enter => Some(Message::Enter),
            KeyCode::Esc => Some(Message::Escape),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }

    fn map_mouse(mouse: event::MouseEvent) -> Option<Message> {
        match mouse.kind {
            MouseEventKind::Down(MouseButton::Left) => {
                Some(Message::MouseDown(mouse.column, mouse.row))
            }
            MouseEventKind::Down(MouseButton::Right) => {
                Some(Message::RightClick(mouse.column, mouse.row))
            }
            MouseEventKind::Drag(MouseButton::Left) => {
                Some(Message::MouseDrag(mouse.column, mouse.row))
            }
            MouseEventKind::Up(MouseButton::Left) => Some(Message::MouseUp(mouse.column, mouse.row)),
            MouseEventKind::ScrollUp => Some(Message::WheelUp),
            MouseEventKind::ScrollDown => Some(Message::WheelDown),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::{KeyModifiers, MouseEvent};

    #[test]
    fn mouse_events_map_to_pointer_messages() {
        let down = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Left),
            column: 12,
            row: 1,
            modifiers: KeyModifiers::NONE,
        };
        assert_eq!(Controller::map_mouse(down), Some(Message::MouseDown(12, 1)));

        let drag = MouseEvent {
            kind: MouseEventKind::Drag(MouseButton::Left),
            column: 20,
            row: 1,
            modifiers: KeyModifiers::NONE,
        };
        assert_eq!(Controller::map_mouse(drag), Some(Message::MouseDrag(20, 1)));

        let right = MouseEvent {
            kind: MouseEventKind::Down(MouseButton::Right),
            column: 5,
            row: 7,
            modifiers: KeyModifiers::NONE,
        };
        assert_eq!(Controller::map_mouse(right), Some(Message::RightClick(5, 7)));

        let moved = MouseEvent {
            kind: MouseEventKind::Moved,
            column: 5,
            row: 7,
            modifiers: KeyModifiers::NONE,
        };
        assert_eq!(Controller::map_mouse(moved), None);
    }
}
