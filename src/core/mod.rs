pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod negotiator;
pub mod pipeline;
pub mod protocol;
pub mod session;
pub mod typing;
