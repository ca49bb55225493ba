//! sim-server
//!
//! Tokio front end for the exchange simulator:
//! - TCP trader sessions speaking the binary protocol
//! - the tick scheduler that drives the deterministic matching core
//! - the match artifacts: audit log and final score board
//!
//! The scheduler only sees channels, so tests can drive a full match
//! without opening a socket.

pub mod config;
pub mod recorder;
pub mod scheduler;
pub mod server;
pub mod session;
pub mod types;
