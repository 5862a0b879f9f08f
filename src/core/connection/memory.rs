//! In-process transport for exercising sessions without a network.
//!
//! Transports built from the same [`MemoryNetwork`] find each other through
//! the descriptor text: the SDP carries the endpoint id, the answering side
//! looks the offerer up by it and vice versa.

use super::descriptor::{DescriptorRole, SessionDescriptor};
use super::{ChannelUnit, LocalDescription, MediaStatus, PeerTransport, TransportEvent};
use crate::core::error::SessionError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

#[derive(Clone)]
struct Endpoint {
    events: mpsc::UnboundedSender<TransportEvent>,
    link: Arc<AtomicBool>,
}

#[derive(Clone, Default)]
pub struct MemoryNetwork {
    endpoints: Arc<Mutex<HashMap<u64, Endpoint>>>,
    next_id: Arc<AtomicU64>,
}

impl MemoryNetwork {
    pub fn transport(&self, events: mpsc::UnboundedSender<TransportEvent>) -> MemoryTransport {
        MemoryTransport {
            network: self.clone(),
            events,
            peer: None,
            link: None,
            closes: 0,
        }
    }

    fn register(&self, endpoint: Endpoint) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        if let Ok(mut map) = self.endpoints.lock() {
            map.insert(id, endpoint);
        }
        id
    }

    fn lookup(&self, sdp: &str) -> Option<Endpoint> {
        let id: u64 = sdp.lines().nth(1)?.strip_prefix("o=memory ")?.parse().ok()?;
        self.endpoints.lock().ok()?.get(&id).cloned()
    }
}

pub struct MemoryTransport {
    network: MemoryNetwork,
    events: mpsc::UnboundedSender<TransportEvent>,
    peer: Option<mpsc::UnboundedSender<TransportEvent>>,
    link: Option<Arc<AtomicBool>>,
    closes: usize,
}

impl MemoryTransport {
    /// How many times [`PeerTransport::close`] has run.
    pub fn closes(&self) -> usize {
        self.closes
    }

    /// Tell the local side its channel failed, as a transport would when
    /// connectivity checks give up.
    pub fn fail(&self) {
        let _ = self.events.send(TransportEvent::ChannelClosed);
    }

    fn describe(&self, role: DescriptorRole, link: Arc<AtomicBool>) -> SessionDescriptor {
        let id = self.network.register(Endpoint {
            events: self.events.clone(),
            link,
        });
        SessionDescriptor::new(role, format!("v=0\r\no=memory {id}\r\n"))
    }

    fn media(audio: bool) -> MediaStatus {
        if audio {
            MediaStatus::Denied("no capture device in memory transport".into())
        } else {
            MediaStatus::NotRequested
        }
    }
}

#[async_trait]
impl PeerTransport for MemoryTransport {
    async fn create_offer(&mut self, audio: bool) -> Result<LocalDescription, SessionError> {
        self.close().await;
        let link = Arc::new(AtomicBool::new(false));
        self.link = Some(link.clone());
        Ok(LocalDescription {
            descriptor: self.describe(DescriptorRole::Offer, link),
            media: Self::media(audio),
        })
    }

    async fn accept_offer(
        &mut self,
        offer: &SessionDescriptor,
        audio: bool,
    ) -> Result<LocalDescription, SessionError> {
        self.close().await;
        let remote = self
            .network
            .lookup(&offer.sdp)
            .ok_or_else(|| SessionError::transport("unknown memory endpoint"))?;
        self.peer = Some(remote.events);
        self.link = Some(remote.link.clone());
        Ok(LocalDescription {
            descriptor: self.describe(DescriptorRole::Answer, remote.link),
            media: Self::media(audio),
        })
    }

    async fn accept_answer(&mut self, answer: &SessionDescriptor) -> Result<(), SessionError> {
        let remote = self
            .network
            .lookup(&answer.sdp)
            .ok_or_else(|| SessionError::transport("unknown memory endpoint"))?;
        let link = self
            .link
            .clone()
            .ok_or_else(|| SessionError::transport("no outstanding offer"))?;
        if !Arc::ptr_eq(&link, &remote.link) {
            return Err(SessionError::transport("answer belongs to another offer"));
        }

        link.store(true, Ordering::SeqCst);
        let _ = remote.events.send(TransportEvent::ChannelOpen);
        let _ = self.events.send(TransportEvent::ChannelOpen);
        self.peer = Some(remote.events);
        Ok(())
    }

    async fn send(&self, unit: ChannelUnit) -> Result<(), SessionError> {
        match (&self.peer, &self.link) {
            (Some(peer), Some(link)) if link.load(Ordering::SeqCst) => peer
                .send(TransportEvent::Message(unit))
                .map_err(|_| SessionError::ChannelClosed),
            _ => Err(SessionError::ChannelClosed),
        }
    }

    async fn close(&mut self) {
        self.closes += 1;
        let peer = self.peer.take();
        if let Some(link) = self.link.take() {
            if link.swap(false, Ordering::SeqCst) {
                if let Some(peer) = peer {
                    let _ = peer.send(TransportEvent::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_linked_pair_exchanges_units() {
        let net = MemoryNetwork::default();
        let (a_tx, mut a_rx) = mpsc::unbounded_channel();
        let (b_tx, mut b_rx) = mpsc::unbounded_channel();
        let mut a = net.transport(a_tx);
        let mut b = net.transport(b_tx);

        let offer = a.create_offer(false).await.unwrap();
        let answer = b.accept_offer(&offer.descriptor, false).await.unwrap();
        assert!(b.send(ChannelUnit::Text("early".into())).await.is_err());

        a.accept_answer(&answer.descriptor).await.unwrap();
        assert_eq!(a_rx.recv().await, Some(TransportEvent::ChannelOpen));
        assert_eq!(b_rx.recv().await, Some(TransportEvent::ChannelOpen));

        b.send(ChannelUnit::Text("hi".into())).await.unwrap();
        assert_eq!(
            a_rx.recv().await,
            Some(TransportEvent::Message(ChannelUnit::Text("hi".into())))
        );

        a.close().await;
        a.close().await;
        assert_eq!(b_rx.recv().await, Some(TransportEvent::ChannelClosed));
        assert!(b_rx.try_recv().is_err());
        assert!(b.send(ChannelUnit::Text("late".into())).await.is_err());
    }

    #[tokio::test]
    async fn test_audio_request_is_denied() {
        let net = MemoryNetwork::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut t = net.transport(tx);
        let local = t.create_offer(true).await.unwrap();
        assert!(matches!(local.media, MediaStatus::Denied(_)));
    }
}
