//! Text rendering for the line-oriented front end.
//!
//! Every function here returns the text to print; the loop in
//! [`crate::ui::run`] decides where it goes.

use crate::core::message::{ChatMessage, Direction};
use crate::core::negotiator::ConnectionState;
use crate::core::session::{SessionEvent, TransferDirection};
use crate::ui::commands::COMMAND_HELP;
use crate::ui::helpers::{format_file_size, format_time};

pub fn render_message(message: &ChatMessage) -> String {
    let time = format_time(message.timestamp);
    let body = match &message.file {
        Some(file) => format!("{} ({})", message.content, format_file_size(file.size)),
        None => message.content.clone(),
    };
    match message.direction {
        Direction::Sent => format!("[{time}] you: {body}"),
        Direction::Received => format!("[{time}] peer: {body}"),
        Direction::System => format!("[{time}] * {body}"),
    }
}

fn render_state(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Idle => "Idle. Use /host or /join.",
        ConnectionState::Generating => "Preparing a connection code...",
        ConnectionState::Offering => "Waiting for your peer's reply code (paste it with /code).",
        ConnectionState::Answering => "Waiting for the host's code (paste it with /code).",
        ConnectionState::Connected => "Connected.",
        ConnectionState::Disconnected => "Disconnected. Use /host or /join to start again.",
    }
}

/// Render a session event, or `None` for events with nothing to show.
pub fn render_event(event: &SessionEvent) -> Option<String> {
    let line = match event {
        SessionEvent::StateChanged(state) => format!("-- {}", render_state(*state)),
        SessionEvent::CodeReady(code) => {
            format!("-- Send this code to your peer:\n\n{code}\n")
        }
        SessionEvent::MessageAppended(message) => render_message(message),
        SessionEvent::HistoryCleared => "-- History cleared.".to_string(),
        // Shown in the prompt instead.
        SessionEvent::RemoteTyping(_) => return None,
        SessionEvent::TransferStarted {
            name,
            size,
            direction,
            ..
        } => match direction {
            TransferDirection::Incoming => {
                format!("-- Receiving {name} ({})", format_file_size(*size))
            }
            TransferDirection::Outgoing => {
                format!("-- Sending {name} ({})", format_file_size(*size))
            }
        },
        SessionEvent::TransferProgress {
            percent, direction, ..
        } => match direction {
            TransferDirection::Incoming => format!("-- received {percent}%"),
            TransferDirection::Outgoing => format!("-- sent {percent}%"),
        },
        SessionEvent::TransferFailed { reason, .. } => format!("-- Transfer failed: {reason}"),
        SessionEvent::CloseScheduled(after) => format!(
            "-- Closing in {} s. Type /cancel to stay.",
            after.as_secs()
        ),
        SessionEvent::CloseCancelled => "-- Close cancelled.".to_string(),
    };
    Some(line)
}

pub fn prompt(peer_typing: bool) -> &'static str {
    if peer_typing {
        "(peer is typing) > "
    } else {
        "> "
    }
}

pub fn help_text() -> String {
    let width = COMMAND_HELP.iter().map(|(c, _)| c.len()).max().unwrap_or(0);
    let mut out = String::from("Commands:\n");
    for (cmd, desc) in COMMAND_HELP {
        out.push_str(&format!("  {cmd:<width$}  {desc}\n"));
    }
    out.push_str("Anything else is sent as a chat message. Ctrl+C quits.");
    out
}
