//! Score keeping: positions, P&L, fees, risk breaches, final ranking.
//!
//! The score keeper is the single writer of position state; it consumes the
//! fill stream and, at the close, marks open positions to produce the final
//! ranking. All arithmetic is integer (`i128` for money totals) so the same
//! tape always yields the same scores.

use std::collections::{BTreeMap, BTreeSet};

use crate::messages::Fill;
use crate::side::Side;
use crate::{InstrumentId, Price, Qty, TraderId, MARKET_PARTICIPANT};

/// Scoring knobs from the match configuration.
#[derive(Debug, Clone, Copy)]
pub struct ScoreParams {
    /// Absolute position limit in lots; 0 disables breach counting.
    pub position_limit: Qty,
    /// Fee charged to the aggressor and credited to the resting side, in
    /// basis points of traded value. 0 disables fees.
    pub taker_fee_bps: i64,
    /// Score multiplier (per mille) applied when a trader breached the
    /// position limit at least once. 1000 = no penalty.
    pub risk_penalty_per_mille: i64,
}

impl Default for ScoreParams {
    fn default() -> Self {
        ScoreParams {
            position_limit: 0,
            taker_fee_bps: 0,
            risk_penalty_per_mille: 1000,
        }
    }
}

/// Open position in one instrument: signed quantity plus the signed cost
/// basis of whatever is still open.
#[derive(Debug, Clone, Copy, Default)]
struct Position {
    net_qty: Qty,
    open_cost: i128,
}

#[derive(Debug, Default)]
struct Account {
    realized: i128,
    fees: i128,
    risk_breaches: u32,
    positions: BTreeMap<InstrumentId, Position>,
}

/// One row of the final score board.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraderScore {
    pub rank: u32,
    pub trader_id: TraderId,
    pub name: String,
    pub realized: i128,
    pub unrealized: i128,
    /// Net fees paid (negative = net rebate received).
    pub fees: i128,
    pub score: i128,
    pub risk_breaches: u32,
    pub disqualified: bool,
}

#[derive(Debug)]
pub struct ScoreKeeper {
    params: ScoreParams,
    accounts: BTreeMap<TraderId, Account>,
}

impl ScoreKeeper {
    pub fn new(params: ScoreParams) -> Self {
        ScoreKeeper {
            params,
            accounts: BTreeMap::new(),
        }
    }

    /// Make sure a trader appears in the ranking even if it never trades.
    pub fn register(&mut self, trader: TraderId) {
        if trader != MARKET_PARTICIPANT {
            self.accounts.entry(trader).or_default();
        }
    }

    /// Apply one fill to both counterparties. The synthetic market
    /// participant carries no score.
    pub fn on_fill(&mut self, fill: &Fill) {
        let aggressor_side = fill.aggressor_side;
        self.apply(
            fill.aggressor_trader,
            fill.instrument,
            aggressor_side,
            fill.price,
            fill.quantity,
            true,
        );
        self.apply(
            fill.resting_trader,
            fill.instrument,
            aggressor_side.opposite(),
            fill.price,
            fill.quantity,
            false,
        );
    }

    /// Current signed position, for risk checks and tests.
    pub fn position(&self, trader: TraderId, instrument: InstrumentId) -> Qty {
        self.accounts
            .get(&trader)
            .and_then(|a| a.positions.get(&instrument))
            .map(|p| p.net_qty)
            .unwrap_or(0)
    }

    /// Mark open positions against `marks` (mid or last trade per
    /// instrument) and produce the ranked score board. Ties break by trader
    /// id so a rerun prints an identical board.
    pub fn final_ranking(
        &self,
        marks: &BTreeMap<InstrumentId, Price>,
        names: &BTreeMap<TraderId, String>,
        disqualified: &BTreeSet<TraderId>,
    ) -> Vec<TraderScore> {
        let mut rows: Vec<TraderScore> = self
            .accounts
            .iter()
            .map(|(&trader, account)| {
                let mut unrealized: i128 = 0;
                for (instrument, pos) in &account.positions {
                    if pos.net_qty == 0 {
                        continue;
                    }
                    if let Some(&mark) = marks.get(instrument) {
                        unrealized += pos.net_qty as i128 * mark as i128 - pos.open_cost;
                    }
                    // Without any observed price the position stays valued
                    // at cost and contributes no unrealized P&L.
                }

                let mut score = account.realized + unrealized - account.fees;
                if account.risk_breaches > 0 {
                    // A penalty can only hurt: it shrinks gains, never losses.
                    let penalized = score * self.params.risk_penalty_per_mille as i128 / 1000;
                    score = score.min(penalized);
                }

                TraderScore {
                    rank: 0,
                    trader_id: trader,
                    name: names.get(&trader).cloned().unwrap_or_default(),
                    realized: account.realized,
                    unrealized,
                    fees: account.fees,
                    score,
                    risk_breaches: account.risk_breaches,
                    disqualified: disqualified.contains(&trader),
                }
            })
            .collect();

        rows.sort_by(|a, b| b.score.cmp(&a.score).then(a.trader_id.cmp(&b.trader_id)));
        for (idx, row) in rows.iter_mut().enumerate() {
            row.rank = idx as u32 + 1;
        }
        rows
    }

    fn apply(
        &mut self,
        trader: TraderId,
        instrument: InstrumentId,
        side: Side,
        price: Price,
        qty: Qty,
        is_aggressor: bool,
    ) {
        if trader == MARKET_PARTICIPANT {
            return;
        }
        let account = self.accounts.entry(trader).or_default();

        if self.params.taker_fee_bps != 0 {
            let fee = price as i128 * qty as i128 * self.params.taker_fee_bps as i128 / 10_000;
            if is_aggressor {
                account.fees += fee;
            } else {
                account.fees -= fee;
            }
        }

        let pos = account.positions.entry(instrument).or_default();
        let price = price as i128;
        let mut signed: i128 = match side {
            Side::Buy => qty as i128,
            Side::Sell => -(qty as i128),
        };

        // Close against an opposing open position first.
        if pos.net_qty != 0 && (pos.net_qty > 0) != (signed > 0) {
            let net_abs = pos.net_qty.unsigned_abs() as i128;
            let closing = signed.abs().min(net_abs);
            // Cost released for the closed portion. Rounds toward zero, but
            // the rounding cancels out of realized + unrealized exactly.
            let portion = pos.open_cost * closing / net_abs;
            let trade_value = price * closing;
            let close_flow = if signed < 0 { trade_value } else { -trade_value };
            account.realized += close_flow - portion;
            pos.open_cost -= portion;
            if signed > 0 {
                pos.net_qty += closing as Qty;
                signed -= closing;
            } else {
                pos.net_qty -= closing as Qty;
                signed += closing;
            }
        }

        // Whatever is left opens or extends in the trade's direction.
        if signed != 0 {
            pos.open_cost += price * signed;
            pos.net_qty += signed as Qty;
        }

        if self.params.position_limit > 0 && pos.net_qty.abs() > self.params.position_limit {
            account.risk_breaches += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill(
        seq: u64,
        aggressor: TraderId,
        resting: TraderId,
        side: Side,
        price: Price,
        qty: Qty,
    ) -> Fill {
        Fill {
            seq,
            timestamp: seq,
            instrument: 1,
            price,
            quantity: qty,
            resting_order: seq * 2,
            resting_trader: resting,
            resting_client: 0,
            resting_remaining: 0,
            aggressor_order: seq * 2 + 1,
            aggressor_trader: aggressor,
            aggressor_client: 0,
            aggressor_remaining: 0,
            aggressor_side: side,
        }
    }

    fn ranking_for(keeper: &ScoreKeeper, mark: Price) -> Vec<TraderScore> {
        let marks = BTreeMap::from([(1, mark)]);
        let names = BTreeMap::new();
        let dq = BTreeSet::new();
        keeper.final_ranking(&marks, &names, &dq)
    }

    #[test]
    fn round_trip_realizes_price_difference() {
        let mut keeper = ScoreKeeper::new(ScoreParams::default());
        // Trader 1 buys 10 at 100 from trader 2, sells 10 at 110 to trader 2.
        keeper.on_fill(&fill(1, 1, 2, Side::Buy, 100, 10));
        keeper.on_fill(&fill(2, 1, 2, Side::Sell, 110, 10));

        let rows = ranking_for(&keeper, 105);
        let t1 = rows.iter().find(|r| r.trader_id == 1).unwrap();
        let t2 = rows.iter().find(|r| r.trader_id == 2).unwrap();
        assert_eq!(t1.realized, 100);
        assert_eq!(t1.unrealized, 0);
        assert_eq!(t2.realized, -100);
        assert_eq!(t1.rank, 1);
        assert_eq!(t2.rank, 2);
    }

    #[test]
    fn open_position_marks_to_market() {
        let mut keeper = ScoreKeeper::new(ScoreParams::default());
        keeper.on_fill(&fill(1, 1, MARKET_PARTICIPANT, Side::Buy, 100, 10));

        let rows = ranking_for(&keeper, 107);
        let t1 = &rows[0];
        assert_eq!(t1.realized, 0);
        assert_eq!(t1.unrealized, 70);
        assert_eq!(t1.score, 70);
    }

    #[test]
    fn short_position_accounting_is_symmetric() {
        let mut keeper = ScoreKeeper::new(ScoreParams::default());
        keeper.on_fill(&fill(1, 1, MARKET_PARTICIPANT, Side::Sell, 100, 10));
        keeper.on_fill(&fill(2, 1, MARKET_PARTICIPANT, Side::Buy, 90, 4));

        assert_eq!(keeper.position(1, 1), -6);
        let rows = ranking_for(&keeper, 95);
        let t1 = &rows[0];
        assert_eq!(t1.realized, 40); // bought back 4 at 10 under
        assert_eq!(t1.unrealized, 30); // short 6, 5 under
        assert_eq!(t1.score, 70);
    }

    #[test]
    fn score_identity_holds_with_rounding() {
        // Odd quantities force the released-cost division to round; the
        // identity realized + unrealized == cash flow + mark value must
        // still hold exactly.
        let mut keeper = ScoreKeeper::new(ScoreParams::default());
        keeper.on_fill(&fill(1, 1, MARKET_PARTICIPANT, Side::Buy, 101, 3));
        keeper.on_fill(&fill(2, 1, MARKET_PARTICIPANT, Side::Buy, 103, 4));
        keeper.on_fill(&fill(3, 1, MARKET_PARTICIPANT, Side::Sell, 107, 5));

        let mark = 104;
        let rows = ranking_for(&keeper, mark);
        let t1 = &rows[0];

        let cash: i128 = -(101 * 3) - (103 * 4) + (107 * 5);
        let expected_total = cash + 2 * mark as i128; // 2 lots still long
        assert_eq!(t1.realized + t1.unrealized, expected_total);
    }

    #[test]
    fn fees_charge_taker_and_credit_maker() {
        let params = ScoreParams {
            taker_fee_bps: 10,
            ..ScoreParams::default()
        };
        let mut keeper = ScoreKeeper::new(params);
        keeper.on_fill(&fill(1, 1, 2, Side::Buy, 10_000, 100));

        let fee = 10_000i128 * 100 * 10 / 10_000;
        let rows = ranking_for(&keeper, 10_000);
        let t1 = rows.iter().find(|r| r.trader_id == 1).unwrap();
        let t2 = rows.iter().find(|r| r.trader_id == 2).unwrap();
        assert_eq!(t1.fees, fee);
        assert_eq!(t2.fees, -fee);
    }

    #[test]
    fn risk_breach_scales_score() {
        let params = ScoreParams {
            position_limit: 5,
            risk_penalty_per_mille: 500,
            ..ScoreParams::default()
        };
        let mut keeper = ScoreKeeper::new(params);
        keeper.on_fill(&fill(1, 1, MARKET_PARTICIPANT, Side::Buy, 100, 10));

        let rows = ranking_for(&keeper, 120);
        let t1 = &rows[0];
        assert_eq!(t1.risk_breaches, 1);
        assert_eq!(t1.unrealized, 200);
        assert_eq!(t1.score, 100);
    }

    #[test]
    fn risk_penalty_never_improves_a_losing_score() {
        let params = ScoreParams {
            position_limit: 5,
            risk_penalty_per_mille: 500,
            ..ScoreParams::default()
        };
        let mut keeper = ScoreKeeper::new(params);
        keeper.on_fill(&fill(1, 1, MARKET_PARTICIPANT, Side::Buy, 100, 10));

        // Marked below cost: the breached trader keeps the full loss.
        let rows = ranking_for(&keeper, 80);
        let t1 = &rows[0];
        assert_eq!(t1.risk_breaches, 1);
        assert_eq!(t1.unrealized, -200);
        assert_eq!(t1.score, -200);
    }

    #[test]
    fn ties_rank_by_trader_id() {
        let mut keeper = ScoreKeeper::new(ScoreParams::default());
        keeper.register(4);
        keeper.register(2);
        keeper.register(9);

        let rows = ranking_for(&keeper, 100);
        let order: Vec<TraderId> = rows.iter().map(|r| r.trader_id).collect();
        assert_eq!(order, vec![2, 4, 9]);
    }
}
