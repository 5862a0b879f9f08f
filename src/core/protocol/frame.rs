//! Wire frames carried on the session channel.
//!
//! Text units are JSON objects tagged by `type`:
//!
//! ```text
//! {"type":"chat","text":"hello"}
//! {"type":"typing"}
//! {"type":"file-meta","id":"<uuid>","name":"a.png","mime":"image/png","size":40000}
//! {"type":"file-progress","id":"<uuid>","percent":45}
//! {"type":"file-end","id":"<uuid>"}
//! ```
//!
//! Binary units are file chunks:
//!
//! ```text
//! [0x02][16 bytes transfer id][4 bytes seq BE][payload]
//! ```

use crate::core::error::SessionError;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frame type marker for binary chunk data.
pub const FRAME_CHUNK: u8 = 0x02;

/// Marker + transfer id + sequence number.
pub const CHUNK_HEADER_LEN: usize = 1 + 16 + 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Frame {
    Chat {
        text: String,
    },
    /// Ephemeral typing indicator (no payload needed).
    Typing,
    /// Announces a file; its chunks follow.
    FileMeta {
        id: Uuid,
        name: String,
        mime: String,
        size: u64,
    },
    FileProgress {
        id: Uuid,
        percent: u8,
    },
    FileEnd {
        id: Uuid,
    },
}

impl Frame {
    /// Discriminant as it appears on the wire.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Chat { .. } => "chat",
            Self::Typing => "typing",
            Self::FileMeta { .. } => "file-meta",
            Self::FileProgress { .. } => "file-progress",
            Self::FileEnd { .. } => "file-end",
        }
    }

    pub fn encode(&self) -> Result<String, SessionError> {
        serde_json::to_string(self).map_err(|e| SessionError::Task(e.to_string()))
    }
}

// ── Chunk frames ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFrame {
    pub id: Uuid,
    pub seq: u32,
    pub payload: Bytes,
}

impl ChunkFrame {
    pub fn encode(id: Uuid, seq: u32, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(CHUNK_HEADER_LEN + payload.len());
        buf.put_u8(FRAME_CHUNK);
        buf.put_slice(id.as_bytes());
        buf.put_u32(seq);
        buf.put_slice(payload);
        buf.freeze()
    }

    pub fn decode(data: &Bytes) -> Result<Self, SessionError> {
        if data.len() < CHUNK_HEADER_LEN {
            return Err(SessionError::UnrecognizedControlFrame(format!(
                "binary unit of {} bytes is shorter than a chunk header",
                data.len()
            )));
        }
        if data[0] != FRAME_CHUNK {
            return Err(SessionError::UnrecognizedControlFrame(format!(
                "unknown binary frame type 0x{:02x}",
                data[0]
            )));
        }

        let mut id = [0u8; 16];
        id.copy_from_slice(&data[1..17]);
        let mut seq = [0u8; 4];
        seq.copy_from_slice(&data[17..CHUNK_HEADER_LEN]);

        Ok(Self {
            id: Uuid::from_bytes(id),
            seq: u32::from_be_bytes(seq),
            payload: data.slice(CHUNK_HEADER_LEN..),
        })
    }
}
