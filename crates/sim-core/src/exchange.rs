//! Multi-instrument exchange orchestrator.
//!
//! Owns one [`OrderBook`] per instrument plus the match-global state no
//! single book can provide:
//! - the order-id allocator (strictly increasing, never reused)
//! - the fill sequence and the append-only trade tape
//! - the `order id -> (owner, instrument)` map used to route cancels
//!
//! All mutation happens through `&mut self` on the scheduler's single owned
//! instance; nothing in here is shared or ambient.

use std::collections::{BTreeMap, HashMap};

use crate::error::RejectReason;
use crate::instrument::Instrument;
use crate::messages::{Fill, MarketTick, SubmitOrder};
use crate::order::{Lifespan, Order};
use crate::order_book::OrderBook;
use crate::side::Side;
use crate::{ClientOrderId, InstrumentId, OrderId, Price, Qty, SimNanos, TraderId, MARKET_PARTICIPANT};

/// Result of an accepted submission.
#[derive(Debug, Clone)]
pub struct SubmitOutcome {
    pub order_id: OrderId,
    pub fills: Vec<Fill>,
    /// Quantity left resting in the book (0 if fully filled or killed).
    pub remaining: Qty,
    pub rested: bool,
}

/// Result of a successful cancel.
#[derive(Debug, Clone, Copy)]
pub struct CancelOutcome {
    pub order_id: OrderId,
    pub client_order_id: ClientOrderId,
    pub instrument: InstrumentId,
    pub cancelled: Qty,
}

/// The exchange: every book, the tape, and the id allocators.
#[derive(Debug)]
pub struct Exchange {
    books: BTreeMap<InstrumentId, OrderBook>,
    /// Which trader and instrument an open (resting) order belongs to.
    order_owner: HashMap<OrderId, (TraderId, InstrumentId)>,
    next_order_id: OrderId,
    next_fill_seq: u64,
    tape: Vec<Fill>,
}

impl Exchange {
    pub fn new(instruments: impl IntoIterator<Item = Instrument>) -> Self {
        Exchange {
            books: instruments
                .into_iter()
                .map(|i| (i.id, OrderBook::new(i)))
                .collect(),
            order_owner: HashMap::new(),
            next_order_id: 1,
            next_fill_seq: 1,
            tape: Vec::new(),
        }
    }

    /// Validate and execute a trader submission.
    ///
    /// Rejections are synchronous and leave the book untouched: a rejected
    /// order consumes no order id and produces no fills.
    pub fn submit(
        &mut self,
        trader: TraderId,
        req: &SubmitOrder,
        now: SimNanos,
    ) -> Result<SubmitOutcome, RejectReason> {
        let book = self
            .books
            .get_mut(&req.instrument)
            .ok_or(RejectReason::UnknownInstrument)?;

        if !book.instrument().valid_price(req.price) {
            return Err(RejectReason::InvalidTick);
        }
        if !book.instrument().valid_quantity(req.quantity) {
            return Err(RejectReason::InvalidLotSize);
        }

        let order = Order {
            id: self.next_order_id,
            client_order_id: req.client_order_id,
            trader_id: trader,
            instrument: req.instrument,
            side: req.side,
            price: req.price,
            quantity: req.quantity,
            remaining: req.quantity,
            lifespan: req.lifespan,
            submitted_at: now,
        };

        if trader != MARKET_PARTICIPANT && book.would_self_match(&order) {
            return Err(RejectReason::SelfMatch);
        }

        self.next_order_id += 1;
        let order_id = order.id;
        let remaining_hint = order.remaining;
        let (mut fills, rested) = book.execute(order);
        self.finish_fills(&mut fills, now);

        let remaining = fills
            .last()
            .map(|f| f.aggressor_remaining)
            .unwrap_or(remaining_hint);
        let remaining = if rested { remaining } else { 0 };
        if rested {
            self.order_owner.insert(order_id, (trader, req.instrument));
        }

        Ok(SubmitOutcome {
            order_id,
            fills,
            remaining,
            rested,
        })
    }

    /// Cancel a resting order owned by `trader`.
    pub fn cancel(
        &mut self,
        trader: TraderId,
        order_id: OrderId,
    ) -> Result<CancelOutcome, RejectReason> {
        let (owner, instrument) = *self
            .order_owner
            .get(&order_id)
            .ok_or(RejectReason::UnknownOrder)?;
        if owner != trader {
            // Never reveal other traders' order ids.
            return Err(RejectReason::UnknownOrder);
        }

        let book = self
            .books
            .get_mut(&instrument)
            .ok_or(RejectReason::UnknownOrder)?;
        let removed = book.cancel(order_id, trader).ok_or(RejectReason::UnknownOrder)?;
        self.order_owner.remove(&order_id);

        Ok(CancelOutcome {
            order_id,
            client_order_id: removed.client_order_id,
            instrument,
            cancelled: removed.remaining,
        })
    }

    /// Cancel every resting order of `trader`, in ascending order-id order.
    /// Used on disconnect and disqualification.
    pub fn cancel_all(&mut self, trader: TraderId) -> Vec<CancelOutcome> {
        let mut ids: Vec<OrderId> = self
            .order_owner
            .iter()
            .filter(|(_, (t, _))| *t == trader)
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();

        let mut outcomes = Vec::with_capacity(ids.len());
        for id in ids {
            if let Ok(outcome) = self.cancel(trader, id) {
                outcomes.push(outcome);
            }
        }
        outcomes
    }

    /// Apply a replayed market tick: replace the synthetic market
    /// participant's liquidity with the tick's depth levels. Each level is
    /// executed as a normal limit order owned by trader 0 and may therefore
    /// fill competitors' resting orders.
    pub fn apply_market_tick(
        &mut self,
        tick: &MarketTick,
        now: SimNanos,
    ) -> Result<Vec<Fill>, RejectReason> {
        if !self.books.contains_key(&tick.instrument) {
            return Err(RejectReason::UnknownInstrument);
        }

        // Synthetic liquidity is replaced wholesale each tick; the audit
        // trail records trader cancels, not this churn.
        self.cancel_all(MARKET_PARTICIPANT);

        let mut fills = Vec::new();
        let sides: [(&[(Price, Qty)], Side); 2] =
            [(&tick.bids, Side::Buy), (&tick.asks, Side::Sell)];
        for (levels, side) in sides {
            for &(price, qty) in levels {
                if price <= 0 || qty <= 0 {
                    continue;
                }
                let id = self.next_order_id;
                self.next_order_id += 1;
                let order = Order {
                    id,
                    client_order_id: 0,
                    trader_id: MARKET_PARTICIPANT,
                    instrument: tick.instrument,
                    side,
                    price,
                    quantity: qty,
                    remaining: qty,
                    lifespan: Lifespan::GoodForDay,
                    submitted_at: now,
                };
                let book = self
                    .books
                    .get_mut(&tick.instrument)
                    .ok_or(RejectReason::UnknownInstrument)?;
                let (execs, rested) = book.execute(order);
                if rested {
                    self.order_owner
                        .insert(id, (MARKET_PARTICIPANT, tick.instrument));
                }
                fills.extend(execs);
            }
        }

        // A crossed input record would trade synthetic against synthetic;
        // such fills carry no information and are dropped from the tape.
        // A dropped fill never reaches finish_fills, so the owner entry of
        // a fully consumed resting order has to be forgotten here.
        fills.retain(|f| {
            if f.resting_trader != MARKET_PARTICIPANT || f.aggressor_trader != MARKET_PARTICIPANT
            {
                return true;
            }
            if f.resting_remaining == 0 {
                self.order_owner.remove(&f.resting_order);
            }
            false
        });
        self.finish_fills(&mut fills, now);

        Ok(fills)
    }

    pub fn book(&self, instrument: InstrumentId) -> Option<&OrderBook> {
        self.books.get(&instrument)
    }

    pub fn mid_price(&self, instrument: InstrumentId) -> Option<Price> {
        self.books.get(&instrument).and_then(OrderBook::mid_price)
    }

    /// The match's append-only trade tape, in fill-sequence order.
    pub fn tape(&self) -> &[Fill] {
        &self.tape
    }

    pub fn num_instruments(&self) -> usize {
        self.books.len()
    }

    /// Stamp sequence numbers and timestamps, drop filled orders from the
    /// owner map, and append to the tape.
    fn finish_fills(&mut self, fills: &mut [Fill], now: SimNanos) {
        for fill in fills.iter_mut() {
            fill.seq = self.next_fill_seq;
            self.next_fill_seq += 1;
            fill.timestamp = now;
            if fill.resting_remaining == 0 {
                self.order_owner.remove(&fill.resting_order);
            }
            self.tape.push(fill.clone());
        }
    }
}
