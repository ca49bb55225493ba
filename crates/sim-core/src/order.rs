//! Internal order representation used inside the order book.
//!
//! An `Order` is owned exclusively by the book once accepted; traders only
//! ever hold the engine-assigned id returned in the acknowledgement.

use crate::side::Side;
use crate::{ClientOrderId, InstrumentId, OrderId, Price, Qty, SimNanos, TraderId};

/// What happens to the unfilled remainder of an order.
///
/// A tagged variant rather than a trait object: the book matches on it
/// exhaustively, so adding a lifespan forces every call site to decide.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Lifespan {
    /// The remainder rests in the book awaiting a counterparty.
    GoodForDay,
    /// Immediate-or-cancel: any remainder is dropped, never rests.
    FillAndKill,
}

/// A single order in the book.
#[derive(Debug, Clone)]
pub struct Order {
    pub id: OrderId,
    pub client_order_id: ClientOrderId,
    pub trader_id: TraderId,
    pub instrument: InstrumentId,
    pub side: Side,
    pub price: Price,

    /// Original quantity.
    pub quantity: Qty,

    /// Remaining unfilled quantity.
    pub remaining: Qty,

    pub lifespan: Lifespan,

    /// Simulated time at which the engine accepted the order.
    pub submitted_at: SimNanos,
}

impl Order {
    pub fn is_filled(&self) -> bool {
        self.remaining == 0
    }

    /// Fill up to `qty` units, returning the quantity actually filled.
    pub fn fill(&mut self, qty: Qty) -> Qty {
        let filled = qty.min(self.remaining);
        self.remaining -= filled;
        filled
    }
}
