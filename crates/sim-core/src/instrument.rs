//! Instrument definitions.
//!
//! Instruments are fixed for the duration of a match; the set is taken from
//! the match configuration and never changes while the clock is running.

use serde::{Deserialize, Serialize};

use crate::{InstrumentId, Price, Qty};

/// A tradeable instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instrument {
    pub id: InstrumentId,
    pub symbol: String,

    /// Valid prices are positive multiples of this, in minor currency units.
    pub tick_size: Price,

    /// Valid quantities are positive multiples of this, in lots.
    pub lot_size: Qty,
}

impl Instrument {
    /// Is `price` a positive multiple of the tick size?
    pub fn valid_price(&self, price: Price) -> bool {
        price > 0 && self.tick_size > 0 && price % self.tick_size == 0
    }

    /// Is `qty` a positive multiple of the lot size?
    pub fn valid_quantity(&self, qty: Qty) -> bool {
        qty > 0 && self.lot_size > 0 && qty % self.lot_size == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instrument() -> Instrument {
        Instrument {
            id: 1,
            symbol: "ETF".to_string(),
            tick_size: 100,
            lot_size: 10,
        }
    }

    #[test]
    fn price_must_be_positive_tick_multiple() {
        let i = instrument();
        assert!(i.valid_price(100));
        assert!(i.valid_price(12_300));
        assert!(!i.valid_price(150));
        assert!(!i.valid_price(0));
        assert!(!i.valid_price(-100));
    }

    #[test]
    fn quantity_must_be_positive_lot_multiple() {
        let i = instrument();
        assert!(i.valid_quantity(10));
        assert!(!i.valid_quantity(15));
        assert!(!i.valid_quantity(0));
        assert!(!i.valid_quantity(-10));
    }
}
