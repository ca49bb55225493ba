//! Transport-agnostic logical messages.
//!
//! - [`OrderRequest`]: what a trader session pulls into the scheduler.
//! - [`TraderNotification`]: what the scheduler pushes back out.
//! - [`MarketTick`] and [`Fill`]: the two immutable event records of a match.
//!
//! Wire encodings live in the `sim-protocol` crate; this module is purely
//! logical, in the same way the matching core is kept free of networking.

use crate::error::RejectReason;
use crate::side::Side;
use crate::{ClientOrderId, InstrumentId, OrderId, Price, Qty, SimNanos, TraderId};

/// Maximum depth levels carried per side of a market tick.
pub const MAX_DEPTH: usize = 5;

/// Scheduler phase. `Closed` is terminal: no state mutation afterwards.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum MatchPhase {
    WarmUp,
    Open,
    Closing,
    Closed,
}

impl MatchPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            MatchPhase::WarmUp => "WARM_UP",
            MatchPhase::Open => "OPEN",
            MatchPhase::Closing => "CLOSING",
            MatchPhase::Closed => "CLOSED",
        }
    }
}

/// Submit a new order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOrder {
    pub client_order_id: ClientOrderId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub quantity: Qty,
    pub lifespan: crate::order::Lifespan,
}

/// Cancel an order by its engine-assigned id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelOrder {
    pub order_id: OrderId,
}

/// A request pulled from a trader session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRequest {
    Submit(SubmitOrder),
    Cancel(CancelOrder),
}

/// One replayed market data update for a single instrument.
///
/// Produced only by the replayer; immutable once emitted. Depth is bid/ask
/// `(price, size)` pairs, best level first, at most [`MAX_DEPTH`] per side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketTick {
    pub instrument: InstrumentId,
    pub timestamp: SimNanos,
    pub bids: Vec<(Price, Qty)>,
    pub asks: Vec<(Price, Qty)>,
}

impl MarketTick {
    /// Mid of the best bid/ask carried by this tick, if both sides are
    /// present. Integer division; the mark stays in minor currency units.
    pub fn mid_price(&self) -> Option<Price> {
        match (self.bids.first(), self.asks.first()) {
            (Some(&(b, _)), Some(&(a, _))) => Some((b + a) / 2),
            _ => None,
        }
    }
}

/// One execution on the trade tape.
///
/// Fills are append-only: the sequence number is strictly increasing and
/// matches the order in which the book applied crossing orders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fill {
    pub seq: u64,
    pub timestamp: SimNanos,
    pub instrument: InstrumentId,

    /// Trade price: always the resting order's price.
    pub price: Price,
    pub quantity: Qty,

    pub resting_order: OrderId,
    pub resting_trader: TraderId,
    pub resting_client: ClientOrderId,
    pub resting_remaining: Qty,

    pub aggressor_order: OrderId,
    pub aggressor_trader: TraderId,
    pub aggressor_client: ClientOrderId,
    pub aggressor_remaining: Qty,

    /// Side of the aggressing order.
    pub aggressor_side: Side,
}

impl Fill {
    /// The side `trader` traded on in this fill, if it participated.
    pub fn side_for(&self, trader: TraderId) -> Option<Side> {
        if trader == self.aggressor_trader {
            Some(self.aggressor_side)
        } else if trader == self.resting_trader {
            Some(self.aggressor_side.opposite())
        } else {
            None
        }
    }
}

/// Per-trader view of a fill, pushed to one counterparty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FillNotice {
    pub order_id: OrderId,
    pub client_order_id: ClientOrderId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub price: Price,
    pub quantity: Qty,
    pub remaining: Qty,
}

/// Acknowledgement of a submit or cancel. `remaining` is the quantity still
/// resting after the request took effect (0 for a cancel or a full fill).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderAck {
    pub order_id: OrderId,
    pub client_order_id: ClientOrderId,
    pub instrument: InstrumentId,
    pub remaining: Qty,
}

/// Synchronous rejection of a request. For a cancel the correlation id is 0
/// (cancels are keyed by engine order id).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderReject {
    pub client_order_id: ClientOrderId,
    pub reason: RejectReason,
}

/// Free-form error notice, e.g. for protocol violations tied to an order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorNotice {
    pub client_order_id: ClientOrderId,
    pub message: String,
}

/// A notification pushed to a trader session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraderNotification {
    MarketTick(MarketTick),
    Fill(FillNotice),
    OrderAck(OrderAck),
    OrderReject(OrderReject),
    Error(ErrorNotice),
}
