//! Terminal front end.
//!
//! One task owns the [`Session`] and multiplexes keystrokes, transport
//! events, session events, the session's next deadline and Ctrl+C. Every
//! edit of a chat draft feeds the outbound typing signal.

pub mod commands;
pub mod console;
pub mod helpers;
pub mod input;

use crate::core::connection::{CryptoConfig, PeerTransport, WebRtcTransport};
use crate::core::message::Direction;
use crate::core::negotiator::ConnectionState;
use crate::core::session::{Session, SessionEvent};
use crate::workers::args::Args;
use anyhow::Context;
use bytes::Bytes;
use commands::{parse_command, Command};
use helpers::{mime_for_path, safe_file_name, unique_path};
use input::{InputAction, LineEditor, Screen};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    let (transport_tx, mut transport_rx) = mpsc::unbounded_channel();
    let (session_tx, mut session_rx) = mpsc::unbounded_channel();

    let transport = WebRtcTransport::new(args.ice_servers(), transport_tx);
    let mut session = Session::new(transport, args.crypto(), args.mic, session_tx);
    let download_dir = args.download_dir();

    let mut screen = Screen::enter().context("Failed to enter raw terminal mode")?;
    let mut keys = input::spawn_reader();
    let mut editor = LineEditor::default();

    info!(event = "ui_started", level = %session.crypto().level, download_dir = %download_dir.display());
    screen.say(&format!(
        "duolink {}. Level: {}. Microphone: {}.",
        env!("CARGO_PKG_VERSION"),
        session.crypto().level,
        if session.audio() { "on" } else { "off" }
    ));
    screen.say(&console::help_text());

    loop {
        screen.prompt(console::prompt(session.is_remote_typing()), &editor);
        let deadline = session.next_deadline();
        tokio::select! {
            key = keys.recv() => {
                let Some(key) = key else {
                    break;
                };
                let action = editor.handle_event(key);
                if handle_input(&mut session, &mut screen, &editor, action).await == Flow::Quit {
                    break;
                }
            }
            Some(event) = transport_rx.recv() => {
                session.handle_transport_event(event, Instant::now());
            }
            Some(event) = session_rx.recv() => {
                on_session_event(&session, &mut screen, &event, &download_dir).await;
            }
            _ = sleep_until(deadline) => {
                session.on_tick(Instant::now()).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!(event = "ctrl_c");
                break;
            }
        }
    }

    session.close(false).await;
    while let Ok(event) = session_rx.try_recv() {
        on_session_event(&session, &mut screen, &event, &download_dir).await;
    }
    info!(event = "ui_stopped");
    Ok(())
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at.into()).await,
        None => std::future::pending().await,
    }
}

async fn handle_input<T: PeerTransport, W: Write>(
    session: &mut Session<T>,
    screen: &mut Screen<W>,
    editor: &LineEditor,
    action: InputAction,
) -> Flow {
    match action {
        InputAction::None => Flow::Continue,
        InputAction::Edited => {
            if editor.is_chat() {
                if let Err(e) = session.on_local_edit(Instant::now()).await {
                    debug!(event = "typing_send_failed", %e);
                }
            }
            Flow::Continue
        }
        InputAction::Submit(line) => handle_line(session, screen, &line).await,
        InputAction::Quit => Flow::Quit,
    }
}

async fn handle_line<T: PeerTransport, W: Write>(
    session: &mut Session<T>,
    screen: &mut Screen<W>,
    line: &str,
) -> Flow {
    let command = match parse_command(line) {
        None => {
            send_chat(session, screen, line).await;
            return Flow::Continue;
        }
        Some(Ok(command)) => command,
        Some(Err(msg)) => {
            screen.say(&format!("-- {msg}"));
            return Flow::Continue;
        }
    };

    let result = match command {
        Command::Host => {
            restart_if_disconnected(session).await;
            session.host().await.map(|_| ())
        }
        Command::Join => {
            restart_if_disconnected(session).await;
            session.join()
        }
        Command::Code(code) => session.accept_code(&code).await.map(|_| ()),
        Command::Send(path) => {
            if let Err(e) = send_file(session, &path).await {
                screen.say(&format!("-- {e:#}"));
            }
            Ok(())
        }
        Command::Level { level, passphrase } => {
            let passphrase = passphrase.unwrap_or_else(|| session.crypto().passphrase.clone());
            session.set_crypto(CryptoConfig::new(level, passphrase));
            screen.say(&format!("-- Level set to {level}."));
            Ok(())
        }
        Command::Mic(on) => {
            session.set_audio(on);
            screen.say(&format!(
                "-- Microphone {} for the next negotiation.",
                if on { "requested" } else { "off" }
            ));
            Ok(())
        }
        Command::History => {
            if session.messages().is_empty() {
                screen.say("-- No messages yet.");
            }
            for message in session.messages() {
                screen.say(&console::render_message(message));
            }
            Ok(())
        }
        Command::Close => {
            session.close(false).await;
            Ok(())
        }
        Command::End => {
            session.begin_close_countdown(Instant::now());
            Ok(())
        }
        Command::Cancel => {
            if !session.cancel_close_countdown() {
                screen.say("-- Nothing to cancel.");
            }
            Ok(())
        }
        Command::Wipe => {
            session.close(true).await;
            Ok(())
        }
        Command::Help => {
            screen.say(&console::help_text());
            Ok(())
        }
        Command::Quit => return Flow::Quit,
    };

    if let Err(e) = result {
        warn!(event = "command_failed", %e);
        screen.say(&format!("-- {e}"));
    }
    Flow::Continue
}

/// A dropped connection must be reset before a new attempt can start.
async fn restart_if_disconnected<T: PeerTransport>(session: &mut Session<T>) {
    if session.state() == ConnectionState::Disconnected {
        session.close(false).await;
    }
}

async fn send_chat<T: PeerTransport, W: Write>(
    session: &mut Session<T>,
    screen: &mut Screen<W>,
    line: &str,
) {
    if line.trim().is_empty() {
        return;
    }
    if let Err(e) = session.send_chat(line).await {
        screen.say(&format!("-- {e}"));
    }
}

async fn send_file<T: PeerTransport>(session: &mut Session<T>, path: &Path) -> anyhow::Result<Uuid> {
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("Cannot read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(safe_file_name)
        .unwrap_or_else(|| "file".to_string());
    let id = session
        .send_file(&name, mime_for_path(path), Bytes::from(data))
        .await?;
    Ok(id)
}

async fn on_session_event<T: PeerTransport, W: Write>(
    session: &Session<T>,
    screen: &mut Screen<W>,
    event: &SessionEvent,
    download_dir: &Path,
) {
    if let Some(line) = console::render_event(event) {
        screen.say(&line);
    }

    let SessionEvent::MessageAppended(message) = event else {
        return;
    };
    let (Direction::Received, Some(file)) = (message.direction, &message.file) else {
        return;
    };
    let Some(shared) = session.file(&file.id) else {
        return;
    };
    match save_download(download_dir, &file.name, &shared.data).await {
        Ok(path) => {
            info!(event = "file_saved", path = %path.display(), bytes = shared.data.len());
            screen.say(&format!("-- Saved to {}", path.display()));
        }
        Err(e) => {
            warn!(event = "file_save_failed", error = %e);
            screen.say(&format!("-- Could not save {}: {e:#}", file.name));
        }
    }
}

async fn save_download(dir: &Path, name: &str, data: &[u8]) -> anyhow::Result<PathBuf> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Cannot create {}", dir.display()))?;
    let path = unique_path(dir, &safe_file_name(name));
    tokio::fs::write(&path, data)
        .await
        .with_context(|| format!("Cannot write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::memory::{MemoryNetwork, MemoryTransport};
    use crate::core::connection::{EncryptionLevel, TransportEvent};
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    type Rx<T> = mpsc::UnboundedReceiver<T>;

    struct Side {
        session: Session<MemoryTransport>,
        transport_rx: Rx<TransportEvent>,
        _events: Rx<SessionEvent>,
    }

    impl Side {
        fn new(net: &MemoryNetwork) -> Self {
            let (ttx, transport_rx) = mpsc::unbounded_channel();
            let (etx, events) = mpsc::unbounded_channel();
            let crypto = CryptoConfig::new(EncryptionLevel::Open, "");
            Self {
                session: Session::new(net.transport(ttx), crypto, false, etx),
                transport_rx,
                _events: events,
            }
        }

        fn pump(&mut self) {
            while let Ok(ev) = self.transport_rx.try_recv() {
                self.session.handle_transport_event(ev, Instant::now());
            }
        }
    }

    async fn connected() -> (Side, Side) {
        let net = MemoryNetwork::default();
        let mut host = Side::new(&net);
        let mut guest = Side::new(&net);
        let offer = host.session.host().await.unwrap();
        guest.session.join().unwrap();
        let answer = guest.session.accept_code(&offer).await.unwrap().unwrap();
        host.session.accept_code(&answer).await.unwrap();
        host.pump();
        guest.pump();
        assert_eq!(guest.session.state(), ConnectionState::Connected);
        (host, guest)
    }

    async fn type_keys(side: &mut Side, editor: &mut LineEditor, text: &str) -> Flow {
        let mut screen = Screen::plain(Vec::new());
        let mut flow = Flow::Continue;
        for c in text.chars() {
            let action = editor.handle_key(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE));
            flow = handle_input(&mut side.session, &mut screen, editor, action).await;
        }
        flow
    }

    #[tokio::test]
    async fn test_keystrokes_signal_typing_before_submit() {
        let (mut host, mut guest) = connected().await;
        let mut editor = LineEditor::default();

        type_keys(&mut host, &mut editor, "hel").await;
        guest.pump();
        assert!(guest.session.is_remote_typing());
        assert!(guest.session.messages().iter().all(|m| m.direction != Direction::Received));

        let mut screen = Screen::plain(Vec::new());
        let action = editor.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        handle_input(&mut host.session, &mut screen, &editor, action).await;
        guest.pump();
        assert!(!guest.session.is_remote_typing());
        assert_eq!(guest.session.messages().last().unwrap().content, "hel");
    }

    #[tokio::test]
    async fn test_command_draft_does_not_signal_typing() {
        let (mut host, mut guest) = connected().await;
        let mut editor = LineEditor::default();
        type_keys(&mut host, &mut editor, "/hel").await;
        guest.pump();
        assert!(!guest.session.is_remote_typing());
    }

    #[tokio::test]
    async fn test_history_without_messages() {
        let net = MemoryNetwork::default();
        let mut side = Side::new(&net);
        let mut screen = Screen::plain(Vec::new());
        assert_eq!(handle_line(&mut side.session, &mut screen, "/history").await, Flow::Continue);
        assert!(String::from_utf8_lossy(screen.output()).contains("No messages yet."));
        assert_eq!(handle_line(&mut side.session, &mut screen, "/quit").await, Flow::Quit);
    }

    #[tokio::test]
    async fn test_save_download_never_overwrites() {
        let dir = std::env::temp_dir().join(format!("duolink-test-{}", Uuid::new_v4()));
        let first = save_download(&dir, "../notes.txt", b"one").await.unwrap();
        let second = save_download(&dir, "notes.txt", b"two").await.unwrap();
        assert_eq!(first, dir.join("notes.txt"));
        assert_eq!(second, dir.join("notes (1).txt"));
        assert_eq!(std::fs::read(&first).unwrap(), b"one");
        assert_eq!(std::fs::read(&second).unwrap(), b"two");
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_sleep_without_deadline_is_pending() {
        let slept = tokio::time::timeout(std::time::Duration::from_millis(20), sleep_until(None)).await;
        assert!(slept.is_err());
        let due = Instant::now();
        sleep_until(Some(due)).await;
    }
}
