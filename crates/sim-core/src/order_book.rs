//! Single-instrument order book with price-time priority.
//!
//! - One instance per instrument.
//! - Bids: `BTreeMap` keyed ascending, best bid = highest key.
//! - Asks: `BTreeMap` keyed ascending, best ask = lowest key.
//! - Strict FIFO within each price level.
//!
//! The book never holds two mutually crossable resting orders: any crossing
//! is resolved into fills at the moment the aggressing order arrives.
//!
//! Cancellation does a linear search over the relevant side. Competition
//! books are shallow, and the simple representation keeps replay behaviour
//! easy to audit.

use std::collections::{BTreeMap, VecDeque};

use crate::instrument::Instrument;
use crate::messages::Fill;
use crate::order::{Lifespan, Order};
use crate::side::Side;
use crate::{OrderId, Price, Qty, TraderId};

/// Per-instrument price-time-priority book.
#[derive(Debug)]
pub struct OrderBook {
    instrument: Instrument,
    bids: BTreeMap<Price, VecDeque<Order>>,
    asks: BTreeMap<Price, VecDeque<Order>>,
}

impl OrderBook {
    pub fn new(instrument: Instrument) -> Self {
        OrderBook {
            instrument,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
        }
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Would this order immediately trade against a resting order of the
    /// same trader? Checked before any fill is executed, so a self-crossing
    /// order produces zero fills.
    pub fn would_self_match(&self, order: &Order) -> bool {
        let same_trader = |q: &VecDeque<Order>| q.iter().any(|o| o.trader_id == order.trader_id);
        match order.side {
            Side::Buy => self.asks.range(..=order.price).any(|(_, q)| same_trader(q)),
            Side::Sell => self.bids.range(order.price..).any(|(_, q)| same_trader(q)),
        }
    }

    /// Match an accepted order against the opposing side, then rest any
    /// remainder if the lifespan allows it.
    ///
    /// Validation (tick size, lot size, self-match) is the caller's job;
    /// this method assumes the order has already been accepted. Returned
    /// fills carry `seq == 0`; the exchange stamps the global sequence.
    /// The second element reports whether a remainder was left resting.
    pub fn execute(&mut self, mut order: Order) -> (Vec<Fill>, bool) {
        let mut fills = Vec::new();

        loop {
            if order.remaining == 0 {
                break;
            }

            let best = match order.side {
                Side::Buy => self.asks.keys().next().copied(),
                Side::Sell => self.bids.keys().next_back().copied(),
            };
            let level = match best {
                Some(p) => p,
                None => break,
            };

            let crosses = match order.side {
                Side::Buy => order.price >= level,
                Side::Sell => order.price <= level,
            };
            if !crosses {
                break;
            }

            let opposing = match order.side {
                Side::Buy => &mut self.asks,
                Side::Sell => &mut self.bids,
            };

            if let Some(queue) = opposing.get_mut(&level) {
                while order.remaining > 0 {
                    let resting = match queue.front_mut() {
                        Some(o) => o,
                        None => break,
                    };

                    let qty = order.remaining.min(resting.remaining);
                    resting.fill(qty);
                    order.fill(qty);

                    // Trade price is the resting order's price.
                    fills.push(Fill {
                        seq: 0,
                        timestamp: order.submitted_at,
                        instrument: self.instrument.id,
                        price: level,
                        quantity: qty,
                        resting_order: resting.id,
                        resting_trader: resting.trader_id,
                        resting_client: resting.client_order_id,
                        resting_remaining: resting.remaining,
                        aggressor_order: order.id,
                        aggressor_trader: order.trader_id,
                        aggressor_client: order.client_order_id,
                        aggressor_remaining: order.remaining,
                        aggressor_side: order.side,
                    });

                    if resting.is_filled() {
                        queue.pop_front();
                    }
                }

                if queue.is_empty() {
                    opposing.remove(&level);
                }
            }
        }

        let rested = order.remaining > 0 && order.lifespan == Lifespan::GoodForDay;
        if rested {
            let levels = match order.side {
                Side::Buy => &mut self.bids,
                Side::Sell => &mut self.asks,
            };
            levels.entry(order.price).or_default().push_back(order);
        }

        (fills, rested)
    }

    /// Remove a resting order owned by `trader`. Returns the removed order,
    /// or `None` if no such order rests in this book for that trader.
    pub fn cancel(&mut self, order_id: OrderId, trader: TraderId) -> Option<Order> {
        for levels in [&mut self.bids, &mut self.asks] {
            let mut hit: Option<(Price, usize)> = None;
            for (price, queue) in levels.iter() {
                if let Some(idx) = queue
                    .iter()
                    .position(|o| o.id == order_id && o.trader_id == trader)
                {
                    hit = Some((*price, idx));
                    break;
                }
            }
            if let Some((price, idx)) = hit {
                let queue = levels.get_mut(&price)?;
                let removed = queue.remove(idx);
                if queue.is_empty() {
                    levels.remove(&price);
                }
                return removed;
            }
        }
        None
    }

    /// Remove every resting order owned by `trader`, in price-level order.
    pub fn cancel_all(&mut self, trader: TraderId) -> Vec<Order> {
        let mut removed = Vec::new();
        for levels in [&mut self.bids, &mut self.asks] {
            let mut empty_prices = Vec::new();
            for (price, queue) in levels.iter_mut() {
                let mut kept = VecDeque::with_capacity(queue.len());
                for order in queue.drain(..) {
                    if order.trader_id == trader {
                        removed.push(order);
                    } else {
                        kept.push_back(order);
                    }
                }
                *queue = kept;
                if queue.is_empty() {
                    empty_prices.push(*price);
                }
            }
            for p in empty_prices {
                levels.remove(&p);
            }
        }
        removed
    }

    /// Best bid as `(price, total quantity at that level)`.
    pub fn best_bid(&self) -> Option<(Price, Qty)> {
        self.bids
            .iter()
            .next_back()
            .map(|(p, q)| (*p, q.iter().map(|o| o.remaining).sum()))
    }

    /// Best ask as `(price, total quantity at that level)`.
    pub fn best_ask(&self) -> Option<(Price, Qty)> {
        self.asks
            .iter()
            .next()
            .map(|(p, q)| (*p, q.iter().map(|o| o.remaining).sum()))
    }

    /// Mid of best bid/ask, if both sides exist.
    pub fn mid_price(&self) -> Option<Price> {
        match (self.best_bid(), self.best_ask()) {
            (Some((b, _)), Some((a, _))) => Some((b + a) / 2),
            _ => None,
        }
    }

    /// Book-consistency invariant: no resting bid may cross a resting ask.
    /// Always false between operations; exposed for tests and asserts.
    pub fn is_crossed(&self) -> bool {
        match (self.best_bid(), self.best_ask()) {
            (Some((b, _)), Some((a, _))) => b >= a,
            _ => false,
        }
    }

    /// Number of resting orders across both sides.
    pub fn depth(&self) -> usize {
        self.bids.values().map(VecDeque::len).sum::<usize>()
            + self.asks.values().map(VecDeque::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument() -> Instrument {
        Instrument {
            id: 1,
            symbol: "ETF".to_string(),
            tick_size: 1,
            lot_size: 1,
        }
    }

    fn order(id: OrderId, trader: TraderId, side: Side, price: Price, qty: Qty) -> Order {
        Order {
            id,
            client_order_id: id as u32,
            trader_id: trader,
            instrument: 1,
            side,
            price,
            quantity: qty,
            remaining: qty,
            lifespan: Lifespan::GoodForDay,
            submitted_at: 0,
        }
    }

    #[test]
    fn fifo_within_price_level() {
        let mut book = OrderBook::new(instrument());
        book.execute(order(1, 1, Side::Sell, 100, 5));
        book.execute(order(2, 2, Side::Sell, 100, 5));

        let (fills, rested) = book.execute(order(3, 3, Side::Buy, 100, 5));
        assert!(!rested);
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].resting_order, 1);
        assert_eq!(fills[0].quantity, 5);
        // Order 2 untouched.
        assert_eq!(book.best_ask(), Some((100, 5)));
    }

    #[test]
    fn better_price_fills_first() {
        let mut book = OrderBook::new(instrument());
        book.execute(order(1, 1, Side::Sell, 101, 5));
        book.execute(order(2, 2, Side::Sell, 100, 5));

        let (fills, _) = book.execute(order(3, 3, Side::Buy, 101, 10));
        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].resting_order, 2);
        assert_eq!(fills[0].price, 100);
        assert_eq!(fills[1].resting_order, 1);
        assert_eq!(fills[1].price, 101);
    }

    #[test]
    fn partial_fill_rests_remainder() {
        let mut book = OrderBook::new(instrument());
        book.execute(order(1, 1, Side::Sell, 100, 3));

        let (fills, rested) = book.execute(order(2, 2, Side::Buy, 100, 10));
        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, 3);
        assert!(rested);
        assert_eq!(book.best_bid(), Some((100, 7)));
        assert!(!book.is_crossed());
    }

    #[test]
    fn fill_and_kill_never_rests() {
        let mut book = OrderBook::new(instrument());
        book.execute(order(1, 1, Side::Sell, 100, 3));

        let mut ioc = order(2, 2, Side::Buy, 100, 10);
        ioc.lifespan = Lifespan::FillAndKill;
        let (fills, rested) = book.execute(ioc);
        assert_eq!(fills.len(), 1);
        assert!(!rested);
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn self_match_detected_before_any_fill() {
        let mut book = OrderBook::new(instrument());
        book.execute(order(1, 7, Side::Sell, 100, 5));

        assert!(book.would_self_match(&order(2, 7, Side::Buy, 100, 5)));
        assert!(!book.would_self_match(&order(3, 7, Side::Buy, 99, 5)));
        assert!(!book.would_self_match(&order(4, 8, Side::Buy, 100, 5)));
    }

    #[test]
    fn cancel_removes_only_the_owners_order() {
        let mut book = OrderBook::new(instrument());
        book.execute(order(1, 1, Side::Buy, 99, 5));

        assert!(book.cancel(1, 2).is_none());
        let removed = book.cancel(1, 1).expect("own order cancels");
        assert_eq!(removed.remaining, 5);
        assert_eq!(book.depth(), 0);
    }

    #[test]
    fn cancel_all_keeps_other_traders() {
        let mut book = OrderBook::new(instrument());
        book.execute(order(1, 1, Side::Buy, 99, 5));
        book.execute(order(2, 2, Side::Buy, 99, 5));
        book.execute(order(3, 1, Side::Sell, 105, 5));

        let removed = book.cancel_all(1);
        assert_eq!(removed.len(), 2);
        assert_eq!(book.depth(), 1);
        assert_eq!(book.best_bid(), Some((99, 5)));
    }
}
