//! One peer-to-peer session: negotiation, channel dispatch and teardown.
//!
//! [`Session`] owns every piece of mutable session state (negotiator, chat
//! log, received files, the incoming transfer slot, typing state and the
//! close countdown) and is driven from a single loop:
//!
//! - user intents: [`Session::host`], [`Session::join`],
//!   [`Session::accept_code`], [`Session::send_chat`],
//!   [`Session::send_file`], [`Session::on_local_edit`], [`Session::close`]
//! - transport callbacks: [`Session::handle_transport_event`]
//! - timers: [`Session::on_tick`] whenever [`Session::next_deadline`] passes
//!
//! Everything the UI needs to know is published as a [`SessionEvent`].

use crate::core::config::CLOSE_COUNTDOWN;
use crate::core::connection::{
    CryptoConfig, MediaStatus, PeerTransport, Ticket, TransportEvent,
};
use crate::core::connection::descriptor::{DescriptorRole, SessionDescriptor};
use crate::core::error::SessionError;
use crate::core::message::{ChatLog, ChatMessage, Direction, FileRef};
use crate::core::negotiator::{ConnectionState, SessionNegotiator};
use crate::core::pipeline::{send_file, FileMeta, OutgoingFile, TransferReceiver};
use crate::core::protocol::mux::send_frame;
use crate::core::protocol::{classify, Frame, Inbound};
use crate::core::typing::{RemoteTyping, TypingDebounce};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub const NOTICE_CONNECTED: &str = "Secure channel established";
pub const NOTICE_CONNECTION_LOST: &str = "Connection lost";
pub const NOTICE_CONNECTION_FAILED: &str = "Connection failed";
pub const NOTICE_CLOSED: &str = "Session closed";

// ── Events ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    Incoming,
    Outgoing,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StateChanged(ConnectionState),
    /// A local code is ready to be handed to the peer.
    CodeReady(String),
    MessageAppended(ChatMessage),
    HistoryCleared,
    RemoteTyping(bool),
    TransferStarted {
        id: Uuid,
        name: String,
        size: u64,
        direction: TransferDirection,
    },
    TransferProgress {
        id: Uuid,
        percent: u8,
        direction: TransferDirection,
    },
    TransferFailed {
        id: Uuid,
        reason: String,
    },
    CloseScheduled(Duration),
    CloseCancelled,
}

/// A file sent or received during the session.
#[derive(Debug, Clone)]
pub struct SharedFile {
    pub meta: FileRef,
    pub data: Bytes,
}

// ── Session ──────────────────────────────────────────────────────────────────

pub struct Session<T: PeerTransport> {
    transport: T,
    crypto: CryptoConfig,
    audio: bool,
    negotiator: SessionNegotiator,
    log: ChatLog,
    files: HashMap<Uuid, SharedFile>,
    receiver: TransferReceiver,
    typing_out: TypingDebounce,
    typing_in: RemoteTyping,
    close_at: Option<Instant>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl<T: PeerTransport> Session<T> {
    pub fn new(
        transport: T,
        crypto: CryptoConfig,
        audio: bool,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            transport,
            crypto,
            audio,
            negotiator: SessionNegotiator::default(),
            log: ChatLog::default(),
            files: HashMap::new(),
            receiver: TransferReceiver::default(),
            typing_out: TypingDebounce::default(),
            typing_in: RemoteTyping::default(),
            close_at: None,
            events,
        }
    }

    // ── Accessors ────────────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.negotiator.state()
    }

    pub fn local_code(&self) -> Option<&str> {
        self.negotiator.local_code()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        self.log.entries()
    }

    pub fn file(&self, id: &Uuid) -> Option<&SharedFile> {
        self.files.get(id)
    }

    pub fn is_remote_typing(&self) -> bool {
        self.typing_in.is_typing()
    }

    pub fn crypto(&self) -> &CryptoConfig {
        &self.crypto
    }

    /// Takes effect for the next code produced or accepted.
    pub fn set_crypto(&mut self, crypto: CryptoConfig) {
        self.crypto = crypto;
    }

    pub fn audio(&self) -> bool {
        self.audio
    }

    pub fn set_audio(&mut self, audio: bool) {
        self.audio = audio;
    }

    fn notify(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    fn append(&mut self, message: ChatMessage) {
        self.notify(SessionEvent::MessageAppended(message.clone()));
        self.log.push(message);
    }

    fn publish_state(&self) {
        self.notify(SessionEvent::StateChanged(self.state()));
    }

    fn require_connected(&self) -> Result<(), SessionError> {
        if self.state() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    fn report_media(&mut self, media: MediaStatus) {
        match media {
            MediaStatus::NotRequested => {}
            MediaStatus::Denied(reason) => {
                let err = SessionError::MediaAcquisitionDenied(reason);
                warn!(event = "audio_denied", %err);
                self.append(ChatMessage::system(format!("{err}. Continuing without audio")));
            }
        }
    }

    // ── Negotiation ──────────────────────────────────────────────────────

    /// Start hosting: gather a local offer and export it as a code.
    pub async fn host(&mut self) -> Result<String, SessionError> {
        self.crypto.secret()?;
        self.negotiator.begin_host()?;
        self.publish_state();

        match self.generate_offer().await {
            Ok(code) => {
                self.negotiator.offer_ready(code.clone())?;
                self.publish_state();
                self.notify(SessionEvent::CodeReady(code.clone()));
                Ok(code)
            }
            Err(e) => {
                warn!(event = "offer_failed", %e);
                self.transport.close().await;
                self.negotiator.reset();
                self.publish_state();
                Err(e)
            }
        }
    }

    async fn generate_offer(&mut self) -> Result<String, SessionError> {
        let local = self.transport.create_offer(self.audio).await?;
        self.report_media(local.media);
        Ticket::new(local.descriptor).export(&self.crypto).await
    }

    /// Start joining: wait for the host's code.
    pub fn join(&mut self) -> Result<(), SessionError> {
        self.crypto.secret()?;
        self.negotiator.begin_join()?;
        self.publish_state();
        Ok(())
    }

    async fn generate_answer(&mut self, offer: &SessionDescriptor) -> Result<String, SessionError> {
        let local = self.transport.accept_offer(offer, self.audio).await?;
        self.report_media(local.media);
        Ticket::new(local.descriptor).export(&self.crypto).await
    }

    /// Accept a code pasted by the peer.
    ///
    /// For a joiner this produces the reply code (also returned). For a host
    /// it applies the answer; the connection is reported later through
    /// [`SessionEvent::StateChanged`]. Failures leave the state untouched
    /// and discard any half-built answer.
    pub async fn accept_code(&mut self, text: &str) -> Result<Option<String>, SessionError> {
        let ticket = Ticket::parse(text, &self.crypto).await?;
        let descriptor = ticket.descriptor;
        self.negotiator.check_remote(descriptor.role)?;

        match descriptor.role {
            DescriptorRole::Offer => match self.generate_answer(&descriptor).await {
                Ok(code) => {
                    self.negotiator.answer_ready(code.clone())?;
                    self.notify(SessionEvent::CodeReady(code.clone()));
                    Ok(Some(code))
                }
                Err(e) => {
                    warn!(event = "answer_failed", %e);
                    self.transport.close().await;
                    Err(e)
                }
            },
            DescriptorRole::Answer => {
                self.transport.accept_answer(&descriptor).await?;
                Ok(None)
            }
        }
    }

    // ── Transport events ─────────────────────────────────────────────────

    pub fn handle_transport_event(&mut self, event: TransportEvent, now: Instant) {
        match event {
            TransportEvent::ChannelOpen => {
                if self.negotiator.on_channel_open() {
                    self.publish_state();
                    self.append(ChatMessage::system(NOTICE_CONNECTED));
                }
            }
            TransportEvent::ChannelClosed => {
                if self.negotiator.on_channel_closed() {
                    warn!(event = "connection_lost", error = %SessionError::ChannelClosed);
                    self.publish_state();
                    self.drop_transfer(&SessionError::ChannelClosed.to_string());
                    if self.typing_in.clear() {
                        self.notify(SessionEvent::RemoteTyping(false));
                    }
                    self.append(ChatMessage::system(NOTICE_CONNECTION_LOST));
                } else if self.negotiator.on_attempt_failed() {
                    warn!(event = "negotiation_failed", error = %SessionError::ChannelClosed);
                    self.publish_state();
                    self.append(ChatMessage::system(NOTICE_CONNECTION_FAILED));
                }
            }
            TransportEvent::Message(unit) => {
                if self.state() != ConnectionState::Connected {
                    debug!(event = "unit_dropped", state = %self.state());
                    return;
                }
                match classify(unit) {
                    Ok(inbound) => self.dispatch(inbound, now),
                    Err(e) => warn!(event = "unit_dropped", %e),
                }
            }
        }
    }

    fn dispatch(&mut self, inbound: Inbound, now: Instant) {
        match inbound {
            Inbound::Frame(Frame::Chat { text }) | Inbound::LegacyChat(text) => {
                if self.typing_in.clear() {
                    self.notify(SessionEvent::RemoteTyping(false));
                }
                self.append(ChatMessage::received(text));
            }
            Inbound::Frame(Frame::Typing) => {
                if self.typing_in.on_signal(now) {
                    self.notify(SessionEvent::RemoteTyping(true));
                }
            }
            Inbound::Frame(Frame::FileMeta { id, name, mime, size }) => {
                let meta = FileMeta {
                    id,
                    name: name.clone(),
                    mime,
                    size,
                };
                match self.receiver.begin(meta) {
                    Ok(()) => self.notify(SessionEvent::TransferStarted {
                        id,
                        name,
                        size,
                        direction: TransferDirection::Incoming,
                    }),
                    Err(e) => self.notify(SessionEvent::TransferFailed {
                        id,
                        reason: e.to_string(),
                    }),
                }
            }
            Inbound::Frame(Frame::FileProgress { id, percent }) => {
                if self.receiver.active().is_some_and(|t| t.meta.id == id) {
                    self.notify(SessionEvent::TransferProgress {
                        id,
                        percent,
                        direction: TransferDirection::Incoming,
                    });
                }
            }
            Inbound::Frame(Frame::FileEnd { id }) => match self.receiver.finish(id) {
                Ok(Some(done)) => {
                    let meta = FileRef {
                        id: done.meta.id,
                        name: done.meta.name,
                        mime: done.meta.mime,
                        size: done.meta.size,
                    };
                    self.store_file(Direction::Received, meta, done.data);
                }
                Ok(None) => {}
                Err(e) => self.notify(SessionEvent::TransferFailed {
                    id,
                    reason: e.to_string(),
                }),
            },
            Inbound::Chunk(chunk) => {
                let id = chunk.id;
                if let Err(e) = self.receiver.push(chunk) {
                    self.notify(SessionEvent::TransferFailed {
                        id,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    fn store_file(&mut self, direction: Direction, meta: FileRef, data: Bytes) {
        self.files.insert(
            meta.id,
            SharedFile {
                meta: meta.clone(),
                data,
            },
        );
        self.append(ChatMessage::file(direction, meta));
    }

    fn drop_transfer(&mut self, reason: &str) {
        if let Some(id) = self.receiver.active().map(|t| t.meta.id) {
            self.receiver.clear();
            self.notify(SessionEvent::TransferFailed {
                id,
                reason: reason.to_string(),
            });
        }
    }

    // ── Outbound ─────────────────────────────────────────────────────────

    pub async fn send_chat(&mut self, text: &str) -> Result<(), SessionError> {
        self.require_connected()?;
        send_frame(&self.transport, &Frame::Chat { text: text.to_string() }).await?;
        self.append(ChatMessage::sent(text));
        Ok(())
    }

    /// The local user edited the draft. Sends a debounced typing frame.
    pub async fn on_local_edit(&mut self, now: Instant) -> Result<(), SessionError> {
        if self.state() != ConnectionState::Connected || !self.typing_out.should_emit(now) {
            return Ok(());
        }
        send_frame(&self.transport, &Frame::Typing).await
    }

    pub async fn send_file(
        &mut self,
        name: &str,
        mime: &str,
        data: Bytes,
    ) -> Result<Uuid, SessionError> {
        self.require_connected()?;
        let file = OutgoingFile::new(name, mime, data);
        self.notify(SessionEvent::TransferStarted {
            id: file.id,
            name: file.name.clone(),
            size: file.data.len() as u64,
            direction: TransferDirection::Outgoing,
        });

        let events = self.events.clone();
        let result = send_file(&self.transport, &file, |percent| {
            let _ = events.send(SessionEvent::TransferProgress {
                id: file.id,
                percent,
                direction: TransferDirection::Outgoing,
            });
        })
        .await;

        if let Err(e) = result {
            self.notify(SessionEvent::TransferFailed {
                id: file.id,
                reason: e.to_string(),
            });
            return Err(e);
        }

        let meta = FileRef {
            id: file.id,
            name: file.name,
            mime: file.mime,
            size: file.data.len() as u64,
        };
        self.store_file(Direction::Sent, meta, file.data);
        Ok(file.id)
    }

    // ── Timers ───────────────────────────────────────────────────────────

    /// Earliest instant at which [`Session::on_tick`] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.typing_in.deadline(), self.close_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub async fn on_tick(&mut self, now: Instant) {
        if self.typing_in.poll(now) {
            self.notify(SessionEvent::RemoteTyping(false));
        }
        if self.close_at.is_some_and(|at| now >= at) {
            info!(event = "close_countdown_elapsed");
            self.close(false).await;
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────

    /// Schedule a graceful close after the countdown. A countdown already
    /// running keeps its deadline.
    pub fn begin_close_countdown(&mut self, now: Instant) {
        if self.close_at.is_none() {
            self.close_at = Some(now + CLOSE_COUNTDOWN);
            info!(event = "close_countdown_started", secs = CLOSE_COUNTDOWN.as_secs());
            self.notify(SessionEvent::CloseScheduled(CLOSE_COUNTDOWN));
        }
    }

    /// Returns `true` if a countdown was running.
    pub fn cancel_close_countdown(&mut self) -> bool {
        let cancelled = self.close_at.take().is_some();
        if cancelled {
            info!(event = "close_countdown_cancelled");
            self.notify(SessionEvent::CloseCancelled);
        }
        cancelled
    }

    /// Tear the session down. Safe to call in any state and repeatedly.
    ///
    /// `clear_history` wipes the chat log and every held file; otherwise a
    /// closing notice is appended when there was something to close.
    pub async fn close(&mut self, clear_history: bool) {
        let was_active = self.state() != ConnectionState::Idle || self.receiver.active().is_some();

        self.close_at = None;
        self.transport.close().await;
        self.drop_transfer(NOTICE_CLOSED);
        if self.typing_in.clear() {
            self.notify(SessionEvent::RemoteTyping(false));
        }
        self.typing_out.reset();

        if self.state() != ConnectionState::Idle {
            self.negotiator.reset();
            self.publish_state();
        }

        if clear_history {
            self.log.clear();
            self.files.clear();
            self.notify(SessionEvent::HistoryCleared);
        } else if was_active {
            self.append(ChatMessage::system(NOTICE_CLOSED));
        }
        info!(event = "session_closed", clear_history, was_active);
    }
}
