//! Raw-mode terminal input and output.
//!
//! The terminal is put in raw mode so every keystroke reaches the session
//! loop, which is what drives the outbound typing signal. [`LineEditor`]
//! keeps the draft, [`Screen`] prints above it and redraws the prompt.

use crossterm::cursor::MoveToColumn;
use crossterm::event::{
    self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent, KeyEventKind,
    KeyModifiers,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType};
use crossterm::{execute, queue};
use std::io::{self, Stdout, Write};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// How long the reader thread blocks before checking whether the loop is gone.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

// ── Line editing ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputAction {
    None,
    /// The draft changed.
    Edited,
    Submit(String),
    Quit,
}

#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: String,
}

impl LineEditor {
    pub fn buffer(&self) -> &str {
        &self.buffer
    }

    /// Whether the draft is a chat message rather than a command.
    pub fn is_chat(&self) -> bool {
        !self.buffer.is_empty() && !self.buffer.starts_with('/')
    }

    pub fn handle_event(&mut self, event: Event) -> InputAction {
        match event {
            Event::Key(key) if key.kind == KeyEventKind::Press => self.handle_key(key),
            Event::Paste(text) => self.paste(&text),
            _ => InputAction::None,
        }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> InputAction {
        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
        match key.code {
            KeyCode::Char('c') if ctrl => InputAction::Quit,
            KeyCode::Char('d') if ctrl && self.buffer.is_empty() => InputAction::Quit,
            KeyCode::Char('u') if ctrl => {
                if self.buffer.is_empty() {
                    return InputAction::None;
                }
                self.buffer.clear();
                InputAction::Edited
            }
            KeyCode::Char(_) if ctrl => InputAction::None,
            KeyCode::Char(c) => {
                self.buffer.push(c);
                InputAction::Edited
            }
            KeyCode::Backspace => match self.buffer.pop() {
                Some(_) => InputAction::Edited,
                None => InputAction::None,
            },
            KeyCode::Enter => InputAction::Submit(std::mem::take(&mut self.buffer)),
            _ => InputAction::None,
        }
    }

    /// Pasted text joins the draft on one line.
    pub fn paste(&mut self, text: &str) -> InputAction {
        let text = text.trim_end_matches(['\r', '\n']);
        if text.is_empty() {
            return InputAction::None;
        }
        self.buffer
            .extend(text.chars().map(|c| if c == '\r' || c == '\n' { ' ' } else { c }));
        InputAction::Edited
    }
}

// ── Event reader ─────────────────────────────────────────────────────────────

/// Forward terminal events from a dedicated thread.
///
/// The thread stops once the receiver is dropped or reading fails; the
/// channel then closes.
pub fn spawn_reader() -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        while !tx.is_closed() {
            match event::poll(POLL_INTERVAL) {
                Ok(false) => continue,
                Ok(true) => match event::read() {
                    Ok(ev) => {
                        if tx.send(ev).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(event = "input_read_failed", %e);
                        break;
                    }
                },
                Err(e) => {
                    warn!(event = "input_poll_failed", %e);
                    break;
                }
            }
        }
        debug!(event = "input_reader_stopped");
    });
    rx
}

// ── Output ───────────────────────────────────────────────────────────────────

/// Prints conversation lines above the prompt.
pub struct Screen<W: Write> {
    out: W,
    raw: bool,
}

impl Screen<Stdout> {
    /// Take over the terminal. Restored when the screen is dropped.
    pub fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        let mut out = io::stdout();
        if let Err(e) = execute!(out, EnableBracketedPaste) {
            debug!(event = "bracketed_paste_unavailable", %e);
        }
        Ok(Self { out, raw: true })
    }
}

impl<W: Write> Screen<W> {
    /// A screen over any writer, leaving the terminal mode alone.
    pub fn plain(out: W) -> Self {
        Self { out, raw: false }
    }

    pub fn say(&mut self, text: &str) {
        if let Err(e) = self.write_lines(text) {
            debug!(event = "screen_write_failed", %e);
        }
    }

    fn write_lines(&mut self, text: &str) -> io::Result<()> {
        queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
        for line in text.split('\n') {
            write!(self.out, "{line}\r\n")?;
        }
        self.out.flush()
    }

    /// Redraw the prompt line with the current draft.
    pub fn prompt(&mut self, prefix: &str, editor: &LineEditor) {
        let drawn = queue!(self.out, MoveToColumn(0), Clear(ClearType::CurrentLine))
            .and_then(|_| write!(self.out, "{prefix}{}", editor.buffer()))
            .and_then(|_| self.out.flush());
        if let Err(e) = drawn {
            debug!(event = "screen_write_failed", %e);
        }
    }

    #[cfg(test)]
    pub fn output(&self) -> &W {
        &self.out
    }
}

impl<W: Write> Drop for Screen<W> {
    fn drop(&mut self) {
        if !self.raw {
            return;
        }
        let _ = execute!(self.out, DisableBracketedPaste);
        let _ = write!(self.out, "\r\n");
        let _ = self.out.flush();
        if let Err(e) = disable_raw_mode() {
            warn!(event = "raw_mode_restore_failed", %e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::CONTROL)
    }

    #[test]
    fn test_typing_edits_buffer() {
        let mut editor = LineEditor::default();
        assert_eq!(editor.handle_key(key(KeyCode::Char('h'))), InputAction::Edited);
        assert_eq!(editor.handle_key(key(KeyCode::Char('i'))), InputAction::Edited);
        assert_eq!(editor.handle_key(key(KeyCode::Char('!'))), InputAction::Edited);
        assert_eq!(editor.handle_key(key(KeyCode::Backspace)), InputAction::Edited);
        assert_eq!(editor.buffer(), "hi");
        assert!(editor.is_chat());

        assert_eq!(
            editor.handle_key(key(KeyCode::Enter)),
            InputAction::Submit("hi".into())
        );
        assert_eq!(editor.buffer(), "");
        assert_eq!(editor.handle_key(key(KeyCode::Backspace)), InputAction::None);
    }

    #[test]
    fn test_control_keys() {
        let mut editor = LineEditor::default();
        editor.paste("draft");
        assert_eq!(editor.handle_key(ctrl('d')), InputAction::None);
        assert_eq!(editor.handle_key(ctrl('u')), InputAction::Edited);
        assert_eq!(editor.buffer(), "");
        assert_eq!(editor.handle_key(ctrl('u')), InputAction::None);
        assert_eq!(editor.handle_key(ctrl('d')), InputAction::Quit);
        assert_eq!(editor.handle_key(ctrl('c')), InputAction::Quit);
        assert_eq!(editor.handle_key(key(KeyCode::Left)), InputAction::None);
    }

    #[test]
    fn test_commands_are_not_chat() {
        let mut editor = LineEditor::default();
        assert!(!editor.is_chat());
        editor.handle_key(key(KeyCode::Char('/')));
        assert!(!editor.is_chat());
    }

    #[test]
    fn test_paste_stays_on_one_line() {
        let mut editor = LineEditor::default();
        assert_eq!(editor.paste("\n"), InputAction::None);
        assert_eq!(editor.paste("/code abc\ndef\r\n"), InputAction::Edited);
        assert_eq!(editor.buffer(), "/code abc def");
    }

    #[test]
    fn test_release_events_ignored() {
        let mut editor = LineEditor::default();
        let mut release = key(KeyCode::Char('x'));
        release.kind = KeyEventKind::Release;
        assert_eq!(editor.handle_event(Event::Key(release)), InputAction::None);
        assert_eq!(
            editor.handle_event(Event::Key(key(KeyCode::Char('x')))),
            InputAction::Edited
        );
        assert_eq!(editor.buffer(), "x");
    }

    #[test]
    fn test_screen_writes_crlf_lines() {
        let mut screen = Screen::plain(Vec::new());
        screen.say("one\ntwo");
        let text = String::from_utf8_lossy(screen.output()).into_owned();
        assert!(text.ends_with("one\r\ntwo\r\n"));
    }
}
