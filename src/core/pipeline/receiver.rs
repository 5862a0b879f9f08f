//! Receiver pipeline: reassembles one incoming file at a time.
//!
//! A transfer opens on `file-meta`, accepts chunks carrying its id in strict
//! sequence order and closes on `file-end`. Anything that would produce a
//! corrupt file (a missing sequence number, more bytes than announced, a
//! short file at the end) aborts the transfer instead.

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::protocol::ChunkFrame;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransferError {
    #[error("transfer {active} is still in progress, rejecting {rejected}")]
    Busy { active: Uuid, rejected: Uuid },

    #[error("chunk {got} arrived, expected {expected}")]
    SequenceGap { expected: u32, got: u32 },

    #[error("received {received} bytes, announced {announced}")]
    SizeMismatch { announced: u64, received: u64 },
}

/// Announced properties of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMeta {
    pub id: Uuid,
    pub name: String,
    pub mime: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFile {
    pub meta: FileMeta,
    pub data: Bytes,
}

#[derive(Debug)]
pub struct IncomingTransfer {
    pub meta: FileMeta,
    chunks: Vec<Bytes>,
    received: u64,
    next_seq: u32,
}

impl IncomingTransfer {
    fn new(meta: FileMeta) -> Self {
        Self {
            meta,
            chunks: Vec::new(),
            received: 0,
            next_seq: 0,
        }
    }

    fn assemble(self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.received as usize);
        for chunk in self.chunks {
            buf.extend_from_slice(&chunk);
        }
        buf.freeze()
    }
}

/// Outcome of feeding one unit to the receiver.
#[derive(Debug, PartialEq, Eq)]
pub enum Accepted {
    /// The unit belonged to the active transfer and was applied.
    Applied,
    /// No active transfer matches the unit's id. Dropped.
    Ignored,
}

/// Single-slot reassembly state.
#[derive(Debug, Default)]
pub struct TransferReceiver {
    active: Option<IncomingTransfer>,
}

impl TransferReceiver {
    pub fn active(&self) -> Option<&IncomingTransfer> {
        self.active.as_ref()
    }

    /// Open a transfer. Rejected while another one is still running; the
    /// running transfer is not affected.
    pub fn begin(&mut self, meta: FileMeta) -> Result<(), TransferError> {
        if let Some(active) = &self.active {
            warn!(event = "transfer_busy", active = %active.meta.id, rejected = %meta.id);
            return Err(TransferError::Busy {
                active: active.meta.id,
                rejected: meta.id,
            });
        }
        info!(event = "transfer_begin", id = %meta.id, name = %meta.name, size = meta.size);
        self.active = Some(IncomingTransfer::new(meta));
        Ok(())
    }

    /// Append a chunk. On error the active transfer has been dropped.
    pub fn push(&mut self, chunk: ChunkFrame) -> Result<Accepted, TransferError> {
        let Some(transfer) = self.active.as_mut().filter(|t| t.meta.id == chunk.id) else {
            debug!(event = "chunk_ignored", id = %chunk.id, seq = chunk.seq);
            return Ok(Accepted::Ignored);
        };

        if chunk.seq != transfer.next_seq {
            let err = TransferError::SequenceGap {
                expected: transfer.next_seq,
                got: chunk.seq,
            };
            self.abort(&err);
            return Err(err);
        }

        let received = transfer.received + chunk.payload.len() as u64;
        if received > transfer.meta.size {
            let err = TransferError::SizeMismatch {
                announced: transfer.meta.size,
                received,
            };
            self.abort(&err);
            return Err(err);
        }

        transfer.received = received;
        transfer.next_seq += 1;
        transfer.chunks.push(chunk.payload);
        Ok(Accepted::Applied)
    }

    /// Close the transfer `id` and hand back the reassembled file.
    pub fn finish(&mut self, id: Uuid) -> Result<Option<CompletedFile>, TransferError> {
        if !matches!(&self.active, Some(t) if t.meta.id == id) {
            debug!(event = "file_end_ignored", %id);
            return Ok(None);
        }
        let Some(transfer) = self.active.take() else {
            return Ok(None);
        };

        if transfer.received != transfer.meta.size {
            let err = TransferError::SizeMismatch {
                announced: transfer.meta.size,
                received: transfer.received,
            };
            warn!(event = "transfer_aborted", %id, %err);
            return Err(err);
        }

        let meta = transfer.meta.clone();
        let data = transfer.assemble();
        info!(event = "transfer_complete", id = %meta.id, bytes = data.len());
        Ok(Some(CompletedFile { meta, data }))
    }

    /// Drop any partial transfer.
    pub fn clear(&mut self) {
        if let Some(t) = self.active.take() {
            debug!(event = "transfer_cleared", id = %t.meta.id, received = t.received);
        }
    }

    fn abort(&mut self, err: &TransferError) {
        if let Some(t) = self.active.take() {
            warn!(event = "transfer_aborted", id = %t.meta.id, %err);
        }
    }
}
