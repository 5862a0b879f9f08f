//! Tracing setup: verbosity filter plus an append-only log file.
//!
//! Nothing is written to stdout or stderr; the terminal belongs to the chat.

use anyhow::Context as _;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Filter directives for a `-v` count.
///
/// webrtc_ice reports late STUN responses as warnings; they are normal and
/// only kept at full trace.
pub fn filter_for(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn,duolink=info,webrtc_ice::agent=error",
        1 => "info,webrtc_ice::agent=error",
        2 => "debug,webrtc_ice::agent=error",
        _ => "trace",
    }
}

/// Install the global subscriber.
pub fn init(verbose: u8, log_path: &Path) -> anyhow::Result<()> {
    let file_layer = FileLogLayer::new(log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;
    tracing_subscriber::registry()
        .with(EnvFilter::new(filter_for(verbose)))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

#[derive(Default)]
struct MessageVisitor {
    message: String,
}

impl MessageVisitor {
    fn push_field(&mut self, name: &str, value: &dyn std::fmt::Display) {
        if name == "message" {
            self.message = if self.message.is_empty() {
                value.to_string()
            } else {
                format!("{value} {{{}}}", self.message)
            };
        } else if self.message.is_empty() {
            self.message = format!("{name} = {value}");
        } else {
            self.message.push_str(&format!(", {name} = {value}"));
        }
    }
}

impl Visit for MessageVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.push_field(field.name(), &format_args!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push_field(field.name(), &value);
    }
}

fn format_line(timestamp: &str, level: Level, target: &str, message: &str) -> String {
    if message.is_empty() {
        format!("[{timestamp}] {level} {target}\n")
    } else {
        format!("[{timestamp}] {level} {target}: {message}\n")
    }
}

// ── File Logging Layer ──────────────────────────────────────────────────────

/// A tracing layer that appends one line per event to a file.
pub struct FileLogLayer {
    writer: Arc<Mutex<File>>,
}

impl FileLogLayer {
    /// Creates parent directories if they don't exist.
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Arc::new(Mutex::new(file)),
        })
    }
}

impl<S: Subscriber> Layer<S> for FileLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);

        let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z").to_string();
        let line = format_line(&timestamp, *meta.level(), meta.target(), &visitor.message);

        if let Ok(mut writer) = self.writer.lock() {
            let _ = writer.write_all(line.as_bytes());
            let _ = writer.flush();
        }
    }
}
