//! Channel multiplexer: classifies inbound units and serializes outbound ones.

use super::frame::{ChunkFrame, Frame};
use crate::core::connection::{ChannelUnit, PeerTransport};
use crate::core::error::SessionError;
use tracing::{debug, trace};
use uuid::Uuid;

/// An inbound unit after classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Frame(Frame),
    /// Plain text from a peer that does not wrap chat in a frame.
    LegacyChat(String),
    Chunk(ChunkFrame),
}

/// Classify one unit received on the channel.
///
/// Text that is not a JSON object with a string `type` is plain chat. A
/// `type` this side does not understand, or a known `type` whose fields do
/// not parse or fall out of range, is [`SessionError::UnrecognizedControlFrame`].
pub fn classify(unit: ChannelUnit) -> Result<Inbound, SessionError> {
    match unit {
        ChannelUnit::Binary(data) => ChunkFrame::decode(&data).map(Inbound::Chunk),
        ChannelUnit::Text(text) => {
            let value = match serde_json::from_str::<serde_json::Value>(&text) {
                Ok(value @ serde_json::Value::Object(_)) => value,
                _ => return Ok(Inbound::LegacyChat(text)),
            };
            let Some(kind) = value.get("type").and_then(|t| t.as_str()).map(str::to_owned) else {
                return Ok(Inbound::LegacyChat(text));
            };

            match serde_json::from_value::<Frame>(value) {
                Ok(Frame::FileProgress { percent, .. }) if percent > 100 => {
                    debug!(event = "frame_unrecognized", %kind, percent, "progress out of range");
                    Err(SessionError::UnrecognizedControlFrame(kind))
                }
                Ok(frame) => {
                    trace!(event = "frame_classified", kind = frame.kind());
                    Ok(Inbound::Frame(frame))
                }
                Err(e) => {
                    debug!(event = "frame_unrecognized", %kind, %e);
                    Err(SessionError::UnrecognizedControlFrame(kind))
                }
            }
        }
    }
}

pub async fn send_frame<T>(transport: &T, frame: &Frame) -> Result<(), SessionError>
where
    T: PeerTransport + ?Sized,
{
    trace!(event = "frame_send", kind = frame.kind());
    transport.send(ChannelUnit::Text(frame.encode()?)).await
}

pub async fn send_chunk<T>(
    transport: &T,
    id: Uuid,
    seq: u32,
    payload: &[u8],
) -> Result<(), SessionError>
where
    T: PeerTransport + ?Sized,
{
    transport
        .send(ChannelUnit::Binary(ChunkFrame::encode(id, seq, payload)))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ChannelUnit {
        ChannelUnit::Text(s.to_string())
    }

    #[test]
    fn test_classify_frames() {
        assert_eq!(
            classify(text(r#"{"type":"typing"}"#)).unwrap(),
            Inbound::Frame(Frame::Typing)
        );
        assert_eq!(
            classify(text(r#"{"type":"chat","text":"{\"type\":\"typing\"}"}"#)).unwrap(),
            Inbound::Frame(Frame::Chat {
                text: r#"{"type":"typing"}"#.into()
            })
        );
    }

    #[test]
    fn test_plain_text_is_legacy_chat() {
        for s in ["hello", "", "42", r#"["typing"]"#, r#"{"kind":"typing"}"#, r#"{"type":7}"#] {
            assert_eq!(classify(text(s)).unwrap(), Inbound::LegacyChat(s.into()));
        }
    }

    #[test]
    fn test_unknown_or_malformed_type_is_unrecognized() {
        for s in [
            r#"{"type":"call-offer"}"#,
            r#"{"type":"file-meta","name":"a"}"#,
            r#"{"type":"file-progress","id":"00000000-0000-0000-0000-000000000000","percent":400}"#,
        ] {
            assert!(
                matches!(classify(text(s)), Err(SessionError::UnrecognizedControlFrame(_))),
                "{s}"
            );
        }
    }

    #[test]
    fn test_progress_percent_capped_at_100() {
        let id = Uuid::new_v4();
        let at = |percent: u32| text(&format!(r#"{{"type":"file-progress","id":"{id}","percent":{percent}}}"#));
        assert_eq!(
            classify(at(100)).unwrap(),
            Inbound::Frame(Frame::FileProgress { id, percent: 100 })
        );
        for percent in [101, 200, 255] {
            assert!(
                matches!(classify(at(percent)), Err(SessionError::UnrecognizedControlFrame(k)) if k == "file-progress"),
                "{percent}"
            );
        }
    }

    #[test]
    fn test_binary_is_chunk() {
        let id = Uuid::new_v4();
        let unit = ChannelUnit::Binary(ChunkFrame::encode(id, 3, b"data"));
        match classify(unit).unwrap() {
            Inbound::Chunk(chunk) => {
                assert_eq!(chunk.id, id);
                assert_eq!(chunk.seq, 3);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
