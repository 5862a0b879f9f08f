//! Typing presence: debounced outbound pings and decaying inbound state.
//!
//! Both halves are plain deadline logic over [`Instant`]s handed in by the
//! caller. The session loop owns the clock and wakes up at
//! [`RemoteTyping::deadline`].

use crate::core::config::{TYPING_DEBOUNCE, TYPING_TIMEOUT};
use std::time::Instant;

/// Rate limit for outbound typing frames.
#[derive(Debug, Default)]
pub struct TypingDebounce {
    last_sent: Option<Instant>,
}

impl TypingDebounce {
    /// Called on every local edit. Returns `true` when a typing frame should
    /// go out now. Suppressed edits are dropped, not queued.
    pub fn should_emit(&mut self, now: Instant) -> bool {
        let due = self
            .last_sent
            .map_or(true, |last| now.saturating_duration_since(last) >= TYPING_DEBOUNCE);
        if due {
            self.last_sent = Some(now);
        }
        due
    }

    pub fn reset(&mut self) {
        self.last_sent = None;
    }
}

/// Whether the peer is typing, with a single restartable expiry.
#[derive(Debug, Default)]
pub struct RemoteTyping {
    expires_at: Option<Instant>,
}

impl RemoteTyping {
    /// A typing frame arrived. Returns `true` if the indicator just turned on.
    pub fn on_signal(&mut self, now: Instant) -> bool {
        let was_typing = self.expires_at.is_some();
        self.expires_at = Some(now + TYPING_TIMEOUT);
        !was_typing
    }

    /// Expire the indicator if its deadline has passed. Returns `true` if it
    /// just turned off.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.expires_at {
            Some(deadline) if now >= deadline => {
                self.expires_at = None;
                true
            }
            _ => false,
        }
    }

    /// Turn the indicator off immediately. Returns `true` if it was on.
    pub fn clear(&mut self) -> bool {
        self.expires_at.take().is_some()
    }

    pub fn is_typing(&self) -> bool {
        self.expires_at.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_debounce_close_edits() {
        let t0 = Instant::now();
        let mut d = TypingDebounce::default();
        assert!(d.should_emit(t0));
        assert!(!d.should_emit(t0 + ms(200)));
    }

    #[test]
    fn test_debounce_spaced_edits() {
        let t0 = Instant::now();
        let mut d = TypingDebounce::default();
        assert!(d.should_emit(t0));
        assert!(d.should_emit(t0 + ms(2000)));
    }

    #[test]
    fn test_debounce_window_counts_from_last_emit() {
        let t0 = Instant::now();
        let mut d = TypingDebounce::default();
        assert!(d.should_emit(t0));
        assert!(!d.should_emit(t0 + ms(1000)));
        assert!(!d.should_emit(t0 + ms(1499)));
        assert!(d.should_emit(t0 + ms(1500)));
        assert!(!d.should_emit(t0 + ms(2900)));
    }

    #[test]
    fn test_remote_typing_decays() {
        let t = Instant::now();
        let mut r = RemoteTyping::default();
        assert!(r.on_signal(t));
        assert!(!r.poll(t + ms(2999)));
        assert!(r.is_typing());
        assert!(r.poll(t + ms(3000)));
        assert!(!r.is_typing());
        assert!(!r.poll(t + ms(5000)));
    }

    #[test]
    fn test_second_signal_extends() {
        let t = Instant::now();
        let mut r = RemoteTyping::default();
        r.on_signal(t);
        assert!(!r.on_signal(t + ms(1000)));
        assert_eq!(r.deadline(), Some(t + ms(4000)));
        assert!(!r.poll(t + ms(3000)));
        assert!(r.poll(t + ms(4000)));
    }

    #[test]
    fn test_clear() {
        let t = Instant::now();
        let mut r = RemoteTyping::default();
        assert!(!r.clear());
        r.on_signal(t);
        assert!(r.clear());
        assert_eq!(r.deadline(), None);
    }
}
