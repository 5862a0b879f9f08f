//! File transfer pipeline: chunked sending and single-slot reassembly.

pub mod receiver;
pub mod sender;

pub use receiver::{FileMeta, TransferReceiver};
pub use sender::{send_file, OutgoingFile};
