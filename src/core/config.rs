//! Centralized configuration constants for Duolink.
//!
//! All tunable parameters live here so they can be reviewed and adjusted
//! in a single place. Wire-format constants (frame tags, envelope layout)
//! stay in their respective modules.

use std::time::Duration;

// ── Codes / Encryption ───────────────────────────────────────────────────────

/// Application-wide secret used by the `Standard` encryption level.
///
/// Every installation ships the same value, so it only obfuscates codes
/// against casual observers. Anyone holding the binary can decrypt them.
pub const APP_SECRET: &str = "Duolink_Internal_v1_Secret";

/// PBKDF2-HMAC-SHA256 rounds used to stretch code passwords.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

// ── Transfer / Chunking ──────────────────────────────────────────────────────

/// File chunk size in bytes (16 KB).
///
/// Small enough to stay under every browser's and webrtc-rs's default SCTP
/// message limit once the 21-byte chunk header is added.
pub const CHUNK_SIZE: usize = 16 * 1024;

/// Progress frames are only emitted on multiples of this percentage.
pub const PROGRESS_STEP: u8 = 5;

/// High watermark for the data channel's buffered amount (4 MB).
///
/// A binary unit is held back while queuing it would push the SCTP send
/// buffer above this mark.
pub const DC_BUFFERED_AMOUNT_HIGH: usize = 4 * 1024 * 1024;

/// How often a held-back unit re-checks the buffered amount.
pub const BACKPRESSURE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Give up waiting for the buffer to drain after this long and send anyway.
pub const BACKPRESSURE_MAX_WAIT: Duration = Duration::from_secs(10);

// ── Presence ─────────────────────────────────────────────────────────────────

/// Minimum gap between two outbound typing frames.
pub const TYPING_DEBOUNCE: Duration = Duration::from_millis(1500);

/// A peer's typing indicator expires this long after its last typing frame.
pub const TYPING_TIMEOUT: Duration = Duration::from_millis(3000);

// ── Lifecycle ────────────────────────────────────────────────────────────────

/// Grace period of the countdown-gated close.
pub const CLOSE_COUNTDOWN: Duration = Duration::from_secs(10);

// ── Connection / Network ─────────────────────────────────────────────────────

/// Label of the single data channel carrying every unit of a session.
pub const DATA_CHANNEL_LABEL: &str = "chat";

/// Public STUN servers used when none are configured.
pub const DEFAULT_ICE_SERVERS: [&str; 2] = [
    "stun:stun.l.google.com:19302",
    "stun:stun1.l.google.com:19302",
];

/// Timeout for ICE candidate gathering.
pub const ICE_GATHER_TIMEOUT: Duration = Duration::from_secs(15);

/// Whether to allow loopback candidates (same-machine testing).
pub const ICE_USE_LOOPBACK: bool = false;
