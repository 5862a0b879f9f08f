//! Peer connection seam.
//!
//! The session drives a [`PeerTransport`]: it asks for a local descriptor,
//! hands over the peer's descriptor and pushes channel units. Everything the
//! transport observes on its own (channel opened, unit received, channel
//! gone) comes back as a [`TransportEvent`] on the mpsc sender it was built
//! with.

pub mod crypto;
pub mod descriptor;
#[cfg(test)]
pub mod memory;
pub mod ticket;
pub mod webrtc;

use crate::core::error::SessionError;
use async_trait::async_trait;
use bytes::Bytes;
use descriptor::SessionDescriptor;

pub use ticket::{CryptoConfig, EncryptionLevel, Ticket};
pub use self::webrtc::WebRtcTransport;

/// One discrete message on the established channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelUnit {
    Text(String),
    Binary(Bytes),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    ChannelOpen,
    Message(ChannelUnit),
    ChannelClosed,
}

/// Outcome of a microphone request made alongside a negotiation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaStatus {
    NotRequested,
    Denied(String),
}

/// A finalized local descriptor (gathering complete) plus the media outcome.
#[derive(Debug, Clone)]
pub struct LocalDescription {
    pub descriptor: SessionDescriptor,
    pub media: MediaStatus,
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Start a fresh attempt as the offering side. Any previous attempt is
    /// discarded first.
    async fn create_offer(&mut self, audio: bool) -> Result<LocalDescription, SessionError>;

    /// Start a fresh attempt as the answering side for `offer`.
    async fn accept_offer(
        &mut self,
        offer: &SessionDescriptor,
        audio: bool,
    ) -> Result<LocalDescription, SessionError>;

    /// Complete an outstanding offer. The channel opening is reported later
    /// as [`TransportEvent::ChannelOpen`].
    async fn accept_answer(&mut self, answer: &SessionDescriptor) -> Result<(), SessionError>;

    async fn send(&self, unit: ChannelUnit) -> Result<(), SessionError>;

    /// Tear down the current attempt. Safe to call repeatedly.
    async fn close(&mut self);
}
