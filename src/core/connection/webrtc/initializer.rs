//! WebRTC connection initialization: API setup, offer/answer, ICE gathering.

use crate::core::config::{DATA_CHANNEL_LABEL, ICE_GATHER_TIMEOUT, ICE_USE_LOOPBACK};
use crate::core::error::SessionError;
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{error, info, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::ice_transport::ice_gatherer_state::RTCIceGathererState;
use webrtc::ice_transport::ice_gathering_state::RTCIceGatheringState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;

use super::control::bind_channel;
use super::HandlerContext;
use crate::core::connection::TransportEvent;

fn ice_servers(urls: &[String]) -> Vec<RTCIceServer> {
    urls.iter()
        .map(|url| RTCIceServer {
            urls: vec![url.clone()],
            ..Default::default()
        })
        .collect()
}

fn create_webrtc_api() -> Result<webrtc::api::API, SessionError> {
    let mut me = MediaEngine::default();
    let reg =
        register_default_interceptors(Registry::new(), &mut me).map_err(SessionError::transport)?;

    let mut se = SettingEngine::default();
    se.set_include_loopback_candidate(ICE_USE_LOOPBACK);

    Ok(APIBuilder::new()
        .with_setting_engine(se)
        .with_media_engine(me)
        .with_interceptor_registry(reg)
        .build())
}

async fn new_peer_connection(
    urls: &[String],
    ctx: &HandlerContext,
) -> Result<Arc<RTCPeerConnection>, SessionError> {
    let api = create_webrtc_api()?;
    let pc = Arc::new(
        api.new_peer_connection(RTCConfiguration {
            ice_servers: ice_servers(urls),
            ..Default::default()
        })
        .await
        .map_err(SessionError::transport)?,
    );

    let ctx = ctx.clone();
    pc.on_peer_connection_state_change(Box::new(move |s| {
        let ctx = ctx.clone();
        Box::pin(async move {
            match s {
                RTCPeerConnectionState::Connected => {
                    info!(event = "webrtc_connected", attempt = ctx.attempt, "WebRTC connection established");
                }
                RTCPeerConnectionState::Failed => {
                    error!(event = "webrtc_failed", attempt = ctx.attempt, "WebRTC connection failed");
                    ctx.emit(TransportEvent::ChannelClosed);
                }
                RTCPeerConnectionState::Disconnected => {
                    warn!(
                        event = "webrtc_disconnected",
                        attempt = ctx.attempt,
                        "WebRTC transient disconnect (ICE may recover)"
                    );
                }
                _ => {}
            }
        })
    }));

    Ok(pc)
}

/// Wait for ICE gathering to finish and return the complete local
/// description. Candidates are never trickled.
async fn gather_local_description(
    pc: &Arc<RTCPeerConnection>,
) -> Result<RTCSessionDescription, SessionError> {
    if pc.ice_gathering_state() != RTCIceGatheringState::Complete {
        let (tx, rx) = oneshot::channel::<()>();
        let tx = Arc::new(std::sync::Mutex::new(Some(tx)));
        pc.on_ice_gathering_state_change(Box::new(move |state| {
            let tx = tx.clone();
            Box::pin(async move {
                if state == RTCIceGathererState::Complete {
                    if let Ok(mut guard) = tx.lock() {
                        if let Some(tx) = guard.take() {
                            let _ = tx.send(());
                        }
                    }
                }
            })
        }));

        // Gathering may have completed between the check and the hook.
        if pc.ice_gathering_state() != RTCIceGatheringState::Complete {
            timeout(ICE_GATHER_TIMEOUT, rx)
                .await
                .map_err(|_| SessionError::transport("ICE gathering timeout"))?
                .map_err(|_| SessionError::transport("ICE gathering channel closed"))?;
        }
    }

    pc.local_description()
        .await
        .ok_or_else(|| SessionError::transport("no local description after ICE gathering"))
}

// ── Offer / Answer ───────────────────────────────────────────────────────────

pub(super) async fn create_offer(
    urls: &[String],
    ctx: HandlerContext,
) -> Result<(Arc<RTCPeerConnection>, RTCSessionDescription), SessionError> {
    let pc = new_peer_connection(urls, &ctx).await?;

    let dc_init = Some(RTCDataChannelInit {
        ordered: Some(true),
        ..Default::default()
    });
    let dc = pc
        .create_data_channel(DATA_CHANNEL_LABEL, dc_init)
        .await
        .map_err(SessionError::transport)?;
    bind_channel(dc, ctx.clone()).await;

    let offer = pc.create_offer(None).await.map_err(SessionError::transport)?;
    pc.set_local_description(offer)
        .await
        .map_err(SessionError::transport)?;
    let desc = gather_local_description(&pc).await?;
    Ok((pc, desc))
}

pub(super) async fn accept_offer(
    urls: &[String],
    offer: RTCSessionDescription,
    ctx: HandlerContext,
) -> Result<(Arc<RTCPeerConnection>, RTCSessionDescription), SessionError> {
    let pc = new_peer_connection(urls, &ctx).await?;

    {
        let ctx = ctx.clone();
        pc.on_data_channel(Box::new(move |dc| {
            let ctx = ctx.clone();
            Box::pin(async move {
                if !ctx.is_current() {
                    return;
                }
                if dc.label() != DATA_CHANNEL_LABEL {
                    warn!(event = "unexpected_data_channel", label = %dc.label());
                    return;
                }
                bind_channel(dc, ctx).await;
            })
        }));
    }

    pc.set_remote_description(offer)
        .await
        .map_err(SessionError::transport)?;
    let answer = pc.create_answer(None).await.map_err(SessionError::transport)?;
    pc.set_local_description(answer)
        .await
        .map_err(SessionError::transport)?;
    let desc = gather_local_description(&pc).await?;
    Ok((pc, desc))
}
