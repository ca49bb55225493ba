//! Market data replay.
//!
//! The replayer holds the recorded tick sequence for a whole match and hands
//! ticks back to the scheduler as simulated time passes them. Exhaustion is
//! the normal end-of-match signal, not an error.

use std::collections::VecDeque;

use crate::messages::MarketTick;
use crate::SimNanos;

#[derive(Debug)]
pub struct MarketDataReplayer {
    pending: VecDeque<MarketTick>,
}

impl MarketDataReplayer {
    /// Build a replayer from parsed tick records. Records are stably sorted
    /// by timestamp, so equal-time ticks keep their file order.
    pub fn new(mut ticks: Vec<MarketTick>) -> Self {
        ticks.sort_by_key(|t| t.timestamp);
        MarketDataReplayer {
            pending: ticks.into(),
        }
    }

    /// Pop every tick due at or before `now`, in emission order.
    pub fn pop_due(&mut self, now: SimNanos) -> Vec<MarketTick> {
        let mut due = Vec::new();
        while self.pending.front().is_some_and(|t| t.timestamp <= now) {
            if let Some(tick) = self.pending.pop_front() {
                due.push(tick);
            }
        }
        due
    }

    /// Timestamp of the next pending tick, if any.
    pub fn next_due_at(&self) -> Option<SimNanos> {
        self.pending.front().map(|t| t.timestamp)
    }

    pub fn is_exhausted(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(instrument: u32, ts: SimNanos) -> MarketTick {
        MarketTick {
            instrument,
            timestamp: ts,
            bids: vec![(100, 10)],
            asks: vec![(101, 10)],
        }
    }

    #[test]
    fn pops_in_time_order_with_stable_ties() {
        let mut replayer =
            MarketDataReplayer::new(vec![tick(2, 10), tick(1, 5), tick(1, 10), tick(2, 20)]);

        assert_eq!(replayer.pop_due(4).len(), 0);
        let first = replayer.pop_due(10);
        assert_eq!(
            first.iter().map(|t| (t.instrument, t.timestamp)).collect::<Vec<_>>(),
            vec![(1, 5), (2, 10), (1, 10)]
        );
        assert!(!replayer.is_exhausted());
        assert_eq!(replayer.next_due_at(), Some(20));

        replayer.pop_due(u64::MAX);
        assert!(replayer.is_exhausted());
    }
}
