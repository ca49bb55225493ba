//! sim-core
//!
//! Pure, deterministic exchange-simulation logic:
//! - fixed-point price/quantity units and id types
//! - instruments, orders, per-instrument order book
//! - multi-instrument exchange (order ids, fill sequence, trade tape)
//! - market data replay
//! - score keeping and ranking
//! - audit event model and recorder trait
//!
//! Everything here runs on simulated time supplied by the caller. There is
//! deliberately no wall clock, no I/O and no async in this crate, so the same
//! input stream always produces the same output stream.

pub mod error;
pub mod exchange;
pub mod instrument;
pub mod messages;
pub mod order;
pub mod order_book;
pub mod recorder;
pub mod replay;
pub mod score;
pub mod side;

/// Price in minor currency units (e.g. cents). Matching never uses floats.
pub type Price = i64;

/// Quantity in lots.
pub type Qty = i64;

/// Simulated time in nanoseconds since match start.
pub type SimNanos = u64;

/// Identifier of a competing trader. Id `0` is reserved for the synthetic
/// market participant that carries replayed liquidity.
pub type TraderId = u32;

/// Engine-assigned order id, strictly increasing for the whole match.
pub type OrderId = u64;

/// Client-assigned correlation id, echoed back in acknowledgements.
pub type ClientOrderId = u32;

/// Instrument identifier.
pub type InstrumentId = u32;

/// The reserved trader id that owns replayed market liquidity.
pub const MARKET_PARTICIPANT: TraderId = 0;

pub use error::{RejectReason, ReplayError};
pub use exchange::{CancelOutcome, Exchange, SubmitOutcome};
pub use instrument::Instrument;
pub use messages::{
    CancelOrder, ErrorNotice, Fill, FillNotice, MarketTick, MatchPhase, OrderAck, OrderReject,
    OrderRequest, SubmitOrder, TraderNotification, MAX_DEPTH,
};
pub use order::{Lifespan, Order};
pub use order_book::OrderBook;
pub use recorder::{AuditEvent, EventRecorder, MemoryRecorder};
pub use replay::MarketDataReplayer;
pub use score::{ScoreKeeper, ScoreParams, TraderScore};
pub use side::Side;
