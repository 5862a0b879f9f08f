//! Data channel handlers: lifecycle callbacks and inbound unit forwarding.

use super::HandlerContext;
use crate::core::connection::{ChannelUnit, TransportEvent};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

/// Make `dc` the attempt's send channel, then attach its callbacks.
///
/// The channel is stored before any `ChannelOpen` can be emitted, so a send
/// issued in response to that event always finds it.
pub(super) async fn bind_channel(dc: Arc<RTCDataChannel>, ctx: HandlerContext) {
    *ctx.channel.write().await = Some(dc.clone());
    attach_dc_handlers(&dc, ctx);
}

/// Attach `on_open`, `on_close`, `on_error` and `on_message` callbacks to `dc`.
fn attach_dc_handlers(dc: &Arc<RTCDataChannel>, ctx: HandlerContext) {
    let open_ctx = ctx.clone();
    let label = dc.label().to_string();
    dc.on_open(Box::new(move || {
        let ctx = open_ctx.clone();
        let label = label.clone();
        Box::pin(async move {
            info!(event = "dc_open", channel = %label, attempt = ctx.attempt);
            ctx.emit(TransportEvent::ChannelOpen);
        })
    }));

    let close_ctx = ctx.clone();
    let label = dc.label().to_string();
    dc.on_close(Box::new(move || {
        let ctx = close_ctx.clone();
        let label = label.clone();
        Box::pin(async move {
            warn!(event = "dc_closed", channel = %label, "DataChannel closed by transport");
            ctx.emit(TransportEvent::ChannelClosed);
        })
    }));

    let label = dc.label().to_string();
    dc.on_error(Box::new(move |err| {
        let label = label.clone();
        Box::pin(async move {
            error!(event = "dc_error", channel = %label, %err, "DataChannel transport error");
        })
    }));

    let msg_ctx = ctx.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let ctx = msg_ctx.clone();
        Box::pin(async move { forward_message(msg, &ctx) })
    }));

    // The answerer may receive a channel that is already open.
    if dc.ready_state() == RTCDataChannelState::Open {
        ctx.emit(TransportEvent::ChannelOpen);
    }
}

fn forward_message(msg: DataChannelMessage, ctx: &HandlerContext) {
    debug!(event = "dc_message", text = msg.is_string, bytes = msg.data.len());
    let unit = if msg.is_string {
        match String::from_utf8(msg.data.to_vec()) {
            Ok(text) => ChannelUnit::Text(text),
            Err(e) => {
                warn!(event = "dc_text_not_utf8", bytes = msg.data.len(), %e, "Dropping text unit");
                return;
            }
        }
    } else {
        ChannelUnit::Binary(msg.data)
    };
    ctx.emit(TransportEvent::Message(unit));
}
