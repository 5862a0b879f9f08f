//! Session channel protocol: frame codec and the inbound classifier.

pub mod frame;
pub mod mux;

pub use frame::{ChunkFrame, Frame};
pub use mux::{classify, Inbound};
