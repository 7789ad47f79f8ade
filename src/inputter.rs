use ratatui::crossterm::event::{self, KeyCode};
use tracing::trace;

/// Single-line text input used for filter editing. Keystrokes are fed in
/// through `read`; submission and cancellation are reported through the
/// returned [`InputResult`].
#[derive(Default)]
pub struct Inputter {
    current_input: String,
    cursor_pos: usize,
    finished: bool,
    canceled: bool,
}

#[derive(Default, Clone, Debug)]
pub struct InputResult {
    pub input: String,
    pub finished: bool,
    pub canceled: bool,
    pub cursor_pos: usize,
}

impl Inputter {
    pub fn read(&mut self, key: event::KeyEvent) -> InputResult {
        match key.code {
            KeyCode::Enter => self.enter(),
            KeyCode::Esc => self.escape(),
            KeyCode::Backspace => self.backspace(),
            KeyCode::Delete => self.delete(),
            KeyCode::Left => self.left(),
            KeyCode::Right => self.right(),
            KeyCode::Home => self.home(),
            KeyCode::End => self.end(),
            code => self.key(code),
        }
    }

    /// Seed the input with existing text, cursor at the end.
    pub fn set(&mut self, s: &str) {
        self.current_input = s.to_string();
        self.cursor_pos = s.chars().count();
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            canceled: self.canceled,
            finished: self.finished,
            input: self.current_input.clone(),
            cursor_pos: self.cursor_pos,
        }
    }

    pub fn clear(&mut self) {
        self.canceled = false;
        self.finished = false;
        self.current_input.clear();
        self.cursor_pos = 0;
    }

    fn enter(&mut self) -> InputResult {
        trace!("Input finished: {}", self.current_input);
        self.finished = true;
        self.get()
    }

    fn escape(&mut self) -> InputResult {
        self.clear();
        self.canceled = true;
        self.finished = true;
        self.get()
    }

    fn backspace(&mut self) -> InputResult {
        if self.cursor_pos > 0 {
            self.cursor_pos -= 1;
            let pos = self.byte_pos();
            self.current_input.remove(pos);
        }
        self.get()
    }

    fn delete(&mut self) -> InputResult {
        if self.cursor_pos < self.current_input.chars().count() {
            let pos = self.byte_pos();
            self.current_input.remove(pos);
        }
        self.get()
    }

    fn left(&mut self) -> InputResult {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
        self.get()
    }

    fn right(&mut self) -> InputResult {
        if self.cursor_pos < self.current_input.chars().count() {
            self.cursor_pos += 1;
        }
        self.get()
    }

    fn home(&mut self) -> InputResult {
        self.cursor_pos = 0;
        self.get()
    }

    fn end(&mut self) -> InputResult {
        self.cursor_pos = self.current_input.chars().count();
        self.get()
    }

    fn key(&mut self, code: KeyCode) -> InputResult {
        if let Some(chr) = code.as_char() {
            let pos = self.byte_pos();
            self.current_input.insert(pos, chr);
            self.cursor_pos += 1;
        }
        self.get()
    }

    /// Byte offset of the cursor's char position.
    fn byte_pos(&self) -> usize {
        self.current_input
            .char_indices()
            .nth(self.cursor_pos)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.current_input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn press(inputter: &mut Inputter, code: KeyCode) -> InputResult {
        inputter.read(KeyEvent::from(code))
    }

    #[test]
    fn typing_and_submitting() {
        let mut i = Inputter::default();
        press(&mut i, KeyCode::Char('>'));
        press(&mut i, KeyCode::Char('3'));
        let r = press(&mut i, KeyCode::Char('0'));
        assert_eq!(r.input, ">30");
        assert!(!r.finished);
        let r = press(&mut i, KeyCode::Enter);
        assert!(r.finished);
        assert!(!r.canceled);
        assert_eq!(r.input, ">30");
    }

    #[test]
    fn escape_cancels_and_clears() {
        let mut i = Inputter::default();
        i.set("abc");
        let r = press(&mut i, KeyCode::Esc);
        assert!(r.canceled);
        assert!(r.finished);
        assert_eq!(r.input, "");
    }

    #[test]
    fn backspace_respects_cursor_position() {
        let mut i = Inputter::default();
        i.set("abc");
        press(&mut i, KeyCode::Left);
        let r = press(&mut i, KeyCode::Backspace);
        assert_eq!(r.input, "ac");
        assert_eq!(r.cursor_pos, 1);
    }

    #[test]
    fn insert_in_the_middle() {
        let mut i = Inputter::default();
        i.set("ac");
        press(&mut i, KeyCode::Left);
        let r = press(&mut i, KeyCode::Char('b'));
        assert_eq!(r.input, "abc");
    }

    #[test]
    fn seeding_places_cursor_at_end() {
        let mut i = Inputter::default();
        i.set("héllo");
        assert_eq!(i.get().cursor_pos, 5);
        let r = press(&mut i, KeyCode::Char('!'));
        assert_eq!(r.input, "héllo!");
    }
}
