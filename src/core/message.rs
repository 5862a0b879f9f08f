//! Chat log entries.

use chrono::Utc;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Sent,
    Received,
    System,
}

/// Reference from a log entry to a file held by the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub id: Uuid,
    pub name: String,
    pub mime: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub direction: Direction,
    pub content: String,
    /// Unix time in milliseconds.
    pub timestamp: i64,
    pub file: Option<FileRef>,
}

impl ChatMessage {
    fn new(direction: Direction, content: impl Into<String>, file: Option<FileRef>) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
            file,
        }
    }

    pub fn sent(content: impl Into<String>) -> Self {
        Self::new(Direction::Sent, content, None)
    }

    pub fn received(content: impl Into<String>) -> Self {
        Self::new(Direction::Received, content, None)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Direction::System, content, None)
    }

    pub fn file(direction: Direction, file: FileRef) -> Self {
        let content = format!("File: {}", file.name);
        Self::new(direction, content, Some(file))
    }
}

/// Append-only message list.
#[derive(Debug, Default)]
pub struct ChatLog {
    entries: Vec<ChatMessage>,
}

impl ChatLog {
    pub fn push(&mut self, message: ChatMessage) -> &ChatMessage {
        self.entries.push(message);
        &self.entries[self.entries.len() - 1]
    }

    pub fn entries(&self) -> &[ChatMessage] {
        &self.entries
    }

    /// Drop every entry. Only a hard close does this.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
