//! Sender pipeline: announces a file, streams its chunks in order and emits
//! progress heartbeats.
//!
//! ```text
//! file-meta ─► chunk 0 ─► [file-progress] ─► chunk 1 ─► ... ─► file-end
//! ```
//!
//! A progress frame follows a chunk only when the percentage computed after
//! it lands on a multiple of [`PROGRESS_STEP`] and differs from the last
//! one sent. Percentages are `floor(index * 100 / total)` over 0-based chunk
//! indices, so the final chunk never reports 100; `file-end` marks
//! completion.

use crate::core::config::{CHUNK_SIZE, PROGRESS_STEP};
use crate::core::connection::PeerTransport;
use crate::core::error::SessionError;
use crate::core::protocol::mux::{send_chunk, send_frame};
use crate::core::protocol::Frame;
use bytes::Bytes;
use tracing::{debug, info};
use uuid::Uuid;

/// Number of chunks a payload of `len` bytes is split into.
pub fn chunk_count(len: usize) -> u32 {
    len.div_ceil(CHUNK_SIZE) as u32
}

// ── Progress ─────────────────────────────────────────────────────────────────

/// Decides which percentages are worth reporting.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u32,
    last: Option<u8>,
}

impl ProgressTracker {
    pub fn new(total_chunks: u32) -> Self {
        Self {
            total: total_chunks,
            last: None,
        }
    }

    /// Record that the chunk at 0-based `index` was sent. Returns the
    /// percentage to report, if any.
    pub fn on_chunk(&mut self, index: u32) -> Option<u8> {
        if self.total == 0 {
            return None;
        }
        let percent = (u64::from(index) * 100 / u64::from(self.total)).min(100) as u8;
        if percent % PROGRESS_STEP != 0 || self.last == Some(percent) {
            return None;
        }
        self.last = Some(percent);
        Some(percent)
    }
}

// ── Outgoing file ────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OutgoingFile {
    pub id: Uuid,
    pub name: String,
    pub mime: String,
    pub data: Bytes,
}

impl OutgoingFile {
    pub fn new(name: impl Into<String>, mime: impl Into<String>, data: Bytes) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mime: mime.into(),
            data,
        }
    }

    pub fn meta(&self) -> Frame {
        Frame::FileMeta {
            id: self.id,
            name: self.name.clone(),
            mime: self.mime.clone(),
            size: self.data.len() as u64,
        }
    }
}

/// Send `file` over `transport`.
///
/// `on_progress` sees every percentage that was put on the wire. The first
/// failed send aborts the transfer and is returned; the peer will see no
/// `file-end` for it.
pub async fn send_file<T, F>(
    transport: &T,
    file: &OutgoingFile,
    mut on_progress: F,
) -> Result<(), SessionError>
where
    T: PeerTransport + ?Sized,
    F: FnMut(u8),
{
    let total = chunk_count(file.data.len());
    info!(
        event = "file_send_start",
        id = %file.id,
        name = %file.name,
        size = file.data.len(),
        chunks = total
    );

    send_frame(transport, &file.meta()).await?;

    let mut progress = ProgressTracker::new(total);
    for (index, chunk) in file.data.chunks(CHUNK_SIZE).enumerate() {
        let index = index as u32;
        send_chunk(transport, file.id, index, chunk).await?;

        if let Some(percent) = progress.on_chunk(index) {
            debug!(event = "file_send_progress", id = %file.id, percent);
            send_frame(transport, &Frame::FileProgress { id: file.id, percent }).await?;
            on_progress(percent);
        }
    }

    send_frame(transport, &Frame::FileEnd { id: file.id }).await?;
    info!(event = "file_send_complete", id = %file.id, name = %file.name);
    Ok(())
}
