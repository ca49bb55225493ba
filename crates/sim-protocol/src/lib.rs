//! sim-protocol
//!
//! Transport encodings for the exchange simulator:
//! - a length-prefix-friendly binary codec for the trader protocol
//! - CSV codecs for the market data file, the audit log and the score board
//!
//! No async dependencies here, just byte buffers and strings; the server
//! crate owns the sockets and framing.

pub mod binary_codec;
pub mod csv_codec;
pub mod wire_types;

pub use binary_codec::{Login, ProtocolError, WireEvent, WireRequest};
pub use wire_types::{MAX_NAME_LEN, PROTOCOL_VERSION};
