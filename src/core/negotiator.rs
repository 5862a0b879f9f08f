//! Connection negotiation state machine.
//!
//! ```text
//!            host                 offer ready           channel open
//!   Idle ───────────► Generating ────────────► Offering ────────────► Connected
//!     │                                                                 ▲   │
//!     │ join       remote offer → local answer                          │   │ channel closed
//!     └─────────► Answering ───────────────────► Answering ─────────────┘   ▼
//!                 (no export)                    (has export)           Disconnected
//!
//!   any state ──reset──► Idle
//! ```
//!
//! The negotiator only tracks where an attempt stands. Producing
//! descriptors, sealing codes and talking to the transport is the
//! session's job; it consults the negotiator before each step and reports
//! the outcome back.

use crate::core::connection::descriptor::DescriptorRole;
use crate::core::error::SessionError;
use std::fmt::{Display, Formatter};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Idle,
    Generating,
    Offering,
    Answering,
    Connected,
    Disconnected,
}

impl Display for ConnectionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::Offering => "offering",
            Self::Answering => "answering",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
        };
        f.write_str(s)
    }
}

/// Which side the local user picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Join,
}

/// The edge set of the state machine. Every mutation goes through here.
pub fn is_allowed(from: ConnectionState, to: ConnectionState) -> bool {
    use ConnectionState::*;
    matches!(
        (from, to),
        (Idle, Generating)
            | (Generating, Offering)
            | (Idle, Answering)
            | (Answering, Answering)
            | (Offering, Connected)
            | (Answering, Connected)
            | (Connected, Disconnected)
            | (_, Idle)
    )
}

#[derive(Debug, Default)]
pub struct SessionNegotiator {
    state: ConnectionState,
    role: Option<Role>,
    /// Exportable code of the current attempt, once finalized.
    local_code: Option<String>,
}

impl SessionNegotiator {
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn local_code(&self) -> Option<&str> {
        self.local_code.as_deref()
    }

    fn transition(&mut self, to: ConnectionState) -> Result<(), SessionError> {
        let from = self.state;
        if !is_allowed(from, to) {
            debug!(event = "transition_rejected", %from, %to);
            return Err(SessionError::InvalidTransition { from, to });
        }
        if from != to {
            info!(event = "state_change", %from, %to);
        }
        self.state = to;
        Ok(())
    }

    /// Idle → Generating.
    pub fn begin_host(&mut self) -> Result<(), SessionError> {
        self.transition(ConnectionState::Generating)?;
        self.role = Some(Role::Host);
        self.local_code = None;
        Ok(())
    }

    /// Generating → Offering, holding the exportable offer.
    pub fn offer_ready(&mut self, code: String) -> Result<(), SessionError> {
        self.transition(ConnectionState::Offering)?;
        self.local_code = Some(code);
        Ok(())
    }

    /// Idle → Answering, with nothing to export yet.
    pub fn begin_join(&mut self) -> Result<(), SessionError> {
        self.transition(ConnectionState::Answering)?;
        self.role = Some(Role::Join);
        self.local_code = None;
        Ok(())
    }

    /// Answering → Answering, now holding the exportable reply.
    pub fn answer_ready(&mut self, code: String) -> Result<(), SessionError> {
        self.transition(ConnectionState::Answering)?;
        self.local_code = Some(code);
        Ok(())
    }

    /// Check that a peer descriptor of `role` can be used right now.
    ///
    /// Offers are only taken by a joiner that has not answered yet; answers
    /// only by a host holding an outstanding offer.
    pub fn check_remote(&self, role: DescriptorRole) -> Result<(), SessionError> {
        let ok = match role {
            DescriptorRole::Offer => {
                self.state == ConnectionState::Answering && self.local_code.is_none()
            }
            DescriptorRole::Answer => {
                self.state == ConnectionState::Offering && self.role == Some(Role::Host)
            }
        };
        if ok {
            Ok(())
        } else {
            Err(SessionError::InvalidCode(format!(
                "an {role} code is not expected while {}",
                self.state
            )))
        }
    }

    /// The channel opened. Returns `true` if this completed the negotiation.
    pub fn on_channel_open(&mut self) -> bool {
        match self.state {
            ConnectionState::Offering | ConnectionState::Answering => {
                self.transition(ConnectionState::Connected).is_ok()
            }
            state => {
                debug!(event = "channel_open_ignored", %state);
                false
            }
        }
    }

    /// The channel went away. Returns `true` if a live connection was lost.
    pub fn on_channel_closed(&mut self) -> bool {
        match self.state {
            ConnectionState::Connected => self.transition(ConnectionState::Disconnected).is_ok(),
            state => {
                debug!(event = "channel_closed_ignored", %state);
                false
            }
        }
    }

    /// The channel went away before it ever opened. An attempt that was
    /// waiting on a reply code is abandoned and the machine returns to Idle.
    /// Returns `true` if an attempt was abandoned.
    pub fn on_attempt_failed(&mut self) -> bool {
        match self.state {
            ConnectionState::Offering | ConnectionState::Answering => {
                info!(event = "attempt_failed", state = %self.state, "Negotiation abandoned");
                self.reset();
                true
            }
            _ => false,
        }
    }

    /// Any state → Idle. Discards the current attempt.
    pub fn reset(&mut self) {
        let _ = self.transition(ConnectionState::Idle);
        self.role = None;
        self.local_code = None;
    }
}
