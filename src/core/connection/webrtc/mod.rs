//! WebRTC binding of [`PeerTransport`].
//!
//! # Protocol Overview
//!
//! - One `RTCPeerConnection` per negotiation attempt
//! - One ordered, reliable data channel (`chat`) created by the offerer
//! - Descriptors are produced only after ICE gathering completes, so a
//!   single copy/paste round trip carries every candidate
//! - Text units travel as data-channel strings, chunks as binary messages
//! - Confidentiality of channel traffic is left to DTLS
//!
//! Callbacks from webrtc-rs fire on its own tasks. Each attempt is tagged
//! with an epoch number and callbacks belonging to a superseded attempt are
//! ignored, so a late `on_close` from a discarded connection never reaches
//! the session.

mod control;
mod initializer;

use super::descriptor::{DescriptorRole, SessionDescriptor};
use super::{ChannelUnit, LocalDescription, MediaStatus, PeerTransport, TransportEvent};
use crate::core::config::{BACKPRESSURE_MAX_WAIT, BACKPRESSURE_POLL_INTERVAL, DC_BUFFERED_AMOUNT_HIGH};
use crate::core::error::SessionError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

// ── Shared handler state ─────────────────────────────────────────────────────

/// State captured by every webrtc-rs callback of one attempt.
#[derive(Clone)]
pub(crate) struct HandlerContext {
    pub events: mpsc::UnboundedSender<TransportEvent>,
    pub channel: Arc<RwLock<Option<Arc<RTCDataChannel>>>>,
    pub epoch: Arc<AtomicU64>,
    /// Epoch of the attempt these handlers were attached for.
    pub attempt: u64,
}

impl HandlerContext {
    pub fn is_current(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) == self.attempt
    }

    /// Forward `event` unless the attempt has been superseded.
    pub fn emit(&self, event: TransportEvent) {
        if self.is_current() {
            let _ = self.events.send(event);
        } else {
            debug!(event = "stale_transport_event", attempt = self.attempt, ?event);
        }
    }
}

// ── Backpressure ─────────────────────────────────────────────────────────────

fn has_room(buffered: usize, next_msg_size: usize) -> bool {
    buffered.saturating_add(next_msg_size) <= DC_BUFFERED_AMOUNT_HIGH
}

/// Poll until the SCTP send buffer has room for `next_msg_size` bytes, or time out.
async fn wait_for_buffer_space(
    dc: &Arc<RTCDataChannel>,
    next_msg_size: usize,
) -> Result<(), SessionError> {
    if dc.ready_state() != RTCDataChannelState::Open {
        return Err(SessionError::ChannelClosed);
    }
    let buffered = dc.buffered_amount().await;
    if has_room(buffered, next_msg_size) {
        return Ok(());
    }

    info!(
        event = "dc_backpressure",
        buffered,
        next_msg = next_msg_size,
        high_watermark = DC_BUFFERED_AMOUNT_HIGH,
        "Applying backpressure - waiting for buffer to drain"
    );

    let deadline = tokio::time::Instant::now() + BACKPRESSURE_MAX_WAIT;
    loop {
        tokio::time::sleep(BACKPRESSURE_POLL_INTERVAL).await;
        if dc.ready_state() != RTCDataChannelState::Open {
            warn!(event = "dc_closed_during_backpressure");
            return Err(SessionError::ChannelClosed);
        }
        let buffered = dc.buffered_amount().await;
        if has_room(buffered, next_msg_size) {
            return Ok(());
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(event = "dc_drain_timeout", buffered, "Buffer drain timeout - proceeding anyway");
            return Ok(());
        }
    }
}

// ── Transport ────────────────────────────────────────────────────────────────

pub struct WebRtcTransport {
    ice_servers: Vec<String>,
    peer_connection: Option<Arc<RTCPeerConnection>>,
    channel: Arc<RwLock<Option<Arc<RTCDataChannel>>>>,
    events: mpsc::UnboundedSender<TransportEvent>,
    epoch: Arc<AtomicU64>,
}

impl WebRtcTransport {
    pub fn new(ice_servers: Vec<String>, events: mpsc::UnboundedSender<TransportEvent>) -> Self {
        Self {
            ice_servers,
            peer_connection: None,
            channel: Arc::new(RwLock::new(None)),
            events,
            epoch: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Invalidate the current attempt and open a fresh handler context.
    fn next_attempt(&self) -> HandlerContext {
        let attempt = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        HandlerContext {
            events: self.events.clone(),
            channel: self.channel.clone(),
            epoch: self.epoch.clone(),
            attempt,
        }
    }

    fn media(audio: bool) -> MediaStatus {
        if audio {
            warn!(event = "audio_unavailable", "No audio capture backend in this build");
            MediaStatus::Denied("no audio capture backend is available".into())
        } else {
            MediaStatus::NotRequested
        }
    }

    fn local_description(
        role: DescriptorRole,
        desc: RTCSessionDescription,
        audio: bool,
    ) -> LocalDescription {
        LocalDescription {
            descriptor: SessionDescriptor::new(role, desc.sdp),
            media: Self::media(audio),
        }
    }

    async fn open_channel(&self) -> Result<Arc<RTCDataChannel>, SessionError> {
        let dc = self
            .channel
            .read()
            .await
            .clone()
            .ok_or(SessionError::NotConnected)?;
        if dc.ready_state() != RTCDataChannelState::Open {
            warn!(event = "send_channel_not_open", state = ?dc.ready_state());
            return Err(SessionError::ChannelClosed);
        }
        Ok(dc)
    }
}

#[async_trait]
impl PeerTransport for WebRtcTransport {
    async fn create_offer(&mut self, audio: bool) -> Result<LocalDescription, SessionError> {
        self.close().await;
        let ctx = self.next_attempt();
        let (pc, desc) = initializer::create_offer(&self.ice_servers, ctx).await?;
        self.peer_connection = Some(pc);
        info!(event = "offer_ready", sdp_bytes = desc.sdp.len());
        Ok(Self::local_description(DescriptorRole::Offer, desc, audio))
    }

    async fn accept_offer(
        &mut self,
        offer: &SessionDescriptor,
        audio: bool,
    ) -> Result<LocalDescription, SessionError> {
        self.close().await;
        let ctx = self.next_attempt();
        let remote = RTCSessionDescription::offer(offer.sdp.clone()).map_err(SessionError::transport)?;
        let (pc, desc) = initializer::accept_offer(&self.ice_servers, remote, ctx).await?;
        self.peer_connection = Some(pc);
        info!(event = "answer_ready", sdp_bytes = desc.sdp.len());
        Ok(Self::local_description(DescriptorRole::Answer, desc, audio))
    }

    async fn accept_answer(&mut self, answer: &SessionDescriptor) -> Result<(), SessionError> {
        let pc = self
            .peer_connection
            .as_ref()
            .ok_or_else(|| SessionError::transport("no outstanding offer"))?;
        let remote = RTCSessionDescription::answer(answer.sdp.clone()).map_err(SessionError::transport)?;
        pc.set_remote_description(remote)
            .await
            .map_err(SessionError::transport)?;
        info!(event = "answer_applied", "Remote answer applied, waiting for channel");
        Ok(())
    }

    async fn send(&self, unit: ChannelUnit) -> Result<(), SessionError> {
        let dc = self.open_channel().await?;
        let sent = match unit {
            ChannelUnit::Text(text) => dc.send_text(text).await,
            ChannelUnit::Binary(data) => {
                wait_for_buffer_space(&dc, data.len()).await?;
                dc.send(&data).await
            }
        };
        sent.map(|_| ()).map_err(SessionError::transport)
    }

    async fn close(&mut self) {
        // Bump first so callbacks fired by our own teardown are dropped.
        self.epoch.fetch_add(1, Ordering::SeqCst);

        if let Some(dc) = self.channel.write().await.take() {
            if let Err(e) = dc.close().await {
                debug!(event = "dc_close_error", %e);
            }
        }
        if let Some(pc) = self.peer_connection.take() {
            match pc.close().await {
                Ok(()) => info!(event = "webrtc_closed", "Peer connection closed locally"),
                Err(e) => warn!(event = "webrtc_close_error", %e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport() -> (WebRtcTransport, mpsc::UnboundedReceiver<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (WebRtcTransport::new(Vec::new(), tx), rx)
    }

    #[test]
    fn test_has_room_at_high_watermark() {
        assert!(has_room(0, 16 * 1024));
        assert!(has_room(DC_BUFFERED_AMOUNT_HIGH - 100, 100));
        assert!(!has_room(DC_BUFFERED_AMOUNT_HIGH - 100, 101));
        assert!(!has_room(DC_BUFFERED_AMOUNT_HIGH, 1));
        assert!(!has_room(usize::MAX, 1));
    }

    #[tokio::test]
    async fn test_backpressure_wait_fails_on_closed_channel() {
        let dc = Arc::new(RTCDataChannel::default());
        assert!(matches!(
            wait_for_buffer_space(&dc, 1024).await,
            Err(SessionError::ChannelClosed)
        ));
    }

    #[tokio::test]
    async fn test_send_without_channel_is_not_connected() {
        let (transport, _rx) = transport();
        assert!(matches!(
            transport.send(ChannelUnit::Text("hi".into())).await,
            Err(SessionError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_bound_channel_is_visible_to_send() {
        let (transport, mut rx) = transport();
        let ctx = transport.next_attempt();
        control::bind_channel(Arc::new(RTCDataChannel::default()), ctx).await;

        // Stored but not open yet: the send reaches the channel and is refused.
        assert!(matches!(
            transport.send(ChannelUnit::Binary(bytes::Bytes::from_static(b"x"))).await,
            Err(SessionError::ChannelClosed)
        ));
        assert!(rx.try_recv().is_err());
    }
}
