//! Slash commands typed at the prompt.
//!
//! Commands are never sent to the peer. Any line that does not start with
//! `/` is a chat message.

use crate::core::connection::EncryptionLevel;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `/host`: generate an offer code.
    Host,
    /// `/join`: wait for the host's code.
    Join,
    /// `/code <text>`: accept the peer's code.
    Code(String),
    /// `/send <path>`: send a file.
    Send(PathBuf),
    /// `/level <standard|personal|open> [passphrase]`
    Level {
        level: EncryptionLevel,
        passphrase: Option<String>,
    },
    /// `/mic <on|off>`
    Mic(bool),
    /// `/history`: print the chat log.
    History,
    /// `/close`: close now, keep history.
    Close,
    /// `/end`: close after the countdown.
    End,
    /// `/cancel`: abort a pending `/end`.
    Cancel,
    /// `/wipe`: close now and clear history.
    Wipe,
    Help,
    Quit,
}

/// Available commands with short descriptions (for `/help` output).
pub const COMMAND_HELP: &[(&str, &str)] = &[
    ("/host", "Generate a connection code for your peer"),
    ("/join", "Join a session; paste the host's code with /code"),
    ("/code <text>", "Accept the code your peer sent you"),
    ("/send <path>", "Send a file"),
    ("/level <standard|personal|open> [passphrase]", "Choose how codes are encrypted"),
    ("/mic <on|off>", "Request the microphone on the next negotiation"),
    ("/history", "Print the conversation so far"),
    ("/close", "Close the session, keep history"),
    ("/end", "Close the session after a short countdown"),
    ("/cancel", "Cancel a pending /end"),
    ("/wipe", "Close the session and erase history"),
    ("/help", "Show available commands"),
    ("/quit", "Exit"),
];

/// Try to parse `input` as a slash-command.
///
/// Returns `None` for a regular message, `Some(Err(msg))` for an unknown
/// command or bad arguments.
pub fn parse_command(input: &str) -> Option<Result<Command, String>> {
    let trimmed = input.trim();
    if !trimmed.starts_with('/') {
        return None;
    }
    let (cmd, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (trimmed, ""),
    };

    let parsed = match cmd {
        "/host" => Ok(Command::Host),
        "/join" => Ok(Command::Join),
        "/code" if rest.is_empty() => Err("Usage: /code <text>".to_string()),
        "/code" => Ok(Command::Code(rest.to_string())),
        "/send" if rest.is_empty() => Err("Usage: /send <path>".to_string()),
        "/send" => Ok(Command::Send(PathBuf::from(rest))),
        "/level" => parse_level(rest),
        "/mic" => match rest {
            "on" => Ok(Command::Mic(true)),
            "off" => Ok(Command::Mic(false)),
            _ => Err("Usage: /mic <on|off>".to_string()),
        },
        "/history" => Ok(Command::History),
        "/close" => Ok(Command::Close),
        "/end" => Ok(Command::End),
        "/cancel" => Ok(Command::Cancel),
        "/wipe" => Ok(Command::Wipe),
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        _ => {
            warn!(event = "unknown_command", command = %cmd, "Unknown command");
            Err(format!("Unknown command: {cmd}"))
        }
    };
    Some(parsed)
}

fn parse_level(rest: &str) -> Result<Command, String> {
    let (level, passphrase) = match rest.split_once(char::is_whitespace) {
        Some((level, pass)) => (level, Some(pass.trim().to_string())),
        None => (rest, None),
    };
    let level = level.parse::<EncryptionLevel>().map_err(|e| e.to_string())?;
    Ok(Command::Level {
        level,
        passphrase: passphrase.filter(|p| !p.is_empty()),
    })
}
