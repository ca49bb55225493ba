//! Matching scenarios covering the engine's contractual behaviour:
//! price-time priority, self-match rejection, validation, lifespans and the
//! book-consistency invariant.

use sim_core::{
    Exchange, Instrument, Lifespan, MarketTick, RejectReason, Side, SubmitOrder,
    MARKET_PARTICIPANT,
};

fn instruments() -> Vec<Instrument> {
    vec![Instrument {
        id: 1,
        symbol: "ETF".to_string(),
        tick_size: 100,
        lot_size: 5,
    }]
}

fn submit(
    client_order_id: u32,
    side: Side,
    price: i64,
    qty: i64,
    lifespan: Lifespan,
) -> SubmitOrder {
    SubmitOrder {
        client_order_id,
        instrument: 1,
        side,
        price,
        quantity: qty,
        lifespan,
    }
}

#[test]
fn price_time_priority_earlier_order_fills_first() {
    // Two sells at 100.00, ids assigned in submission order, then a buy of
    // the first order's size: the earlier sell fills completely, the later
    // one is untouched.
    let mut ex = Exchange::new(instruments());
    let s1 = ex
        .submit(1, &submit(11, Side::Sell, 10_000, 5, Lifespan::GoodForDay), 0)
        .unwrap();
    let s2 = ex
        .submit(2, &submit(21, Side::Sell, 10_000, 5, Lifespan::GoodForDay), 1)
        .unwrap();
    assert!(s1.order_id < s2.order_id);

    let buy = ex
        .submit(3, &submit(31, Side::Buy, 10_000, 5, Lifespan::GoodForDay), 2)
        .unwrap();
    assert_eq!(buy.fills.len(), 1);
    assert_eq!(buy.fills[0].resting_order, s1.order_id);
    assert_eq!(buy.fills[0].quantity, 5);
    assert_eq!(ex.book(1).unwrap().best_ask(), Some((10_000, 5)));
}

#[test]
fn self_match_rejects_later_order_with_zero_fills() {
    let mut ex = Exchange::new(instruments());
    ex.submit(4, &submit(1, Side::Buy, 10_000, 5, Lifespan::GoodForDay), 0)
        .unwrap();

    let err = ex
        .submit(4, &submit(2, Side::Sell, 10_000, 5, Lifespan::GoodForDay), 1)
        .unwrap_err();
    assert_eq!(err, RejectReason::SelfMatch);
    assert!(ex.tape().is_empty());
    // The earlier order still rests.
    assert_eq!(ex.book(1).unwrap().best_bid(), Some((10_000, 5)));
}

#[test]
fn tick_and_lot_validation() {
    let mut ex = Exchange::new(instruments());
    assert_eq!(
        ex.submit(1, &submit(1, Side::Buy, 10_001, 5, Lifespan::GoodForDay), 0)
            .unwrap_err(),
        RejectReason::InvalidTick
    );
    assert_eq!(
        ex.submit(1, &submit(2, Side::Buy, 10_000, 7, Lifespan::GoodForDay), 0)
            .unwrap_err(),
        RejectReason::InvalidLotSize
    );
    assert_eq!(
        ex.submit(1, &submit(3, Side::Buy, 10_000, -5, Lifespan::GoodForDay), 0)
            .unwrap_err(),
        RejectReason::InvalidLotSize
    );
}

#[test]
fn fill_and_kill_remainder_is_dropped() {
    let mut ex = Exchange::new(instruments());
    ex.submit(1, &submit(1, Side::Sell, 10_000, 5, Lifespan::GoodForDay), 0)
        .unwrap();

    let ioc = ex
        .submit(2, &submit(2, Side::Buy, 10_000, 15, Lifespan::FillAndKill), 1)
        .unwrap();
    assert_eq!(ioc.fills.len(), 1);
    assert_eq!(ioc.fills[0].quantity, 5);
    assert_eq!(ioc.remaining, 0);
    assert!(!ioc.rested);
    assert_eq!(ex.book(1).unwrap().best_bid(), None);
    // A killed order cannot be cancelled later.
    assert_eq!(
        ex.cancel(2, ioc.order_id).unwrap_err(),
        RejectReason::UnknownOrder
    );
}

#[test]
fn book_never_stays_crossed() {
    let mut ex = Exchange::new(instruments());
    let steps = [
        (1u32, Side::Buy, 10_000i64, 10i64),
        (2, Side::Sell, 10_200, 10),
        (3, Side::Sell, 9_900, 25),
        (1, Side::Buy, 10_300, 20),
        (2, Side::Sell, 9_800, 5),
    ];
    for (i, (trader, side, price, qty)) in steps.into_iter().enumerate() {
        let _ = ex.submit(
            trader,
            &submit(i as u32, side, price, qty, Lifespan::GoodForDay),
            i as u64,
        );
        assert!(
            !ex.book(1).unwrap().is_crossed(),
            "book crossed after step {i}"
        );
    }
}

#[test]
fn fill_sequence_matches_application_order() {
    let mut ex = Exchange::new(instruments());
    ex.submit(1, &submit(1, Side::Sell, 10_000, 5, Lifespan::GoodForDay), 0)
        .unwrap();
    ex.submit(2, &submit(2, Side::Sell, 10_100, 5, Lifespan::GoodForDay), 0)
        .unwrap();
    ex.submit(3, &submit(3, Side::Buy, 10_100, 10, Lifespan::GoodForDay), 1)
        .unwrap();

    let tick = MarketTick {
        instrument: 1,
        timestamp: 2,
        bids: vec![(9_900, 100)],
        asks: vec![(10_000, 100)],
    };
    ex.apply_market_tick(&tick, 2).unwrap();

    let seqs: Vec<u64> = ex.tape().iter().map(|f| f.seq).collect();
    let expected: Vec<u64> = (1..=seqs.len() as u64).collect();
    assert_eq!(seqs, expected);

    let mut timestamps: Vec<u64> = ex.tape().iter().map(|f| f.timestamp).collect();
    let sorted = {
        let mut t = timestamps.clone();
        t.sort_unstable();
        t
    };
    assert_eq!(timestamps, sorted);
    timestamps.dedup();
    assert!(!timestamps.is_empty());
}

#[test]
fn disconnect_style_cancel_all_leaves_others_untouched() {
    let mut ex = Exchange::new(instruments());
    ex.submit(1, &submit(1, Side::Buy, 9_900, 10, Lifespan::GoodForDay), 0)
        .unwrap();
    ex.submit(2, &submit(2, Side::Buy, 9_800, 10, Lifespan::GoodForDay), 0)
        .unwrap();
    ex.submit(1, &submit(3, Side::Sell, 10_200, 10, Lifespan::GoodForDay), 0)
        .unwrap();

    let cancelled = ex.cancel_all(1);
    assert_eq!(cancelled.len(), 2);
    assert!(cancelled.windows(2).all(|w| w[0].order_id < w[1].order_id));
    assert_eq!(ex.book(1).unwrap().best_bid(), Some((9_800, 10)));
    assert_eq!(ex.book(1).unwrap().best_ask(), None);
}

#[test]
fn market_participant_is_exempt_from_self_match() {
    let mut ex = Exchange::new(instruments());
    let tick = MarketTick {
        instrument: 1,
        timestamp: 0,
        bids: vec![(9_900, 100)],
        asks: vec![(10_000, 100)],
    };
    ex.apply_market_tick(&tick, 0).unwrap();

    // Tighter quotes replace the old ones without tripping the self-match
    // check, even though trader 0 rests on both sides.
    let tick2 = MarketTick {
        instrument: 1,
        timestamp: 1,
        bids: vec![(9_950, 100)],
        asks: vec![(9_990, 100)],
    };
    ex.apply_market_tick(&tick2, 1).unwrap();
    assert!(ex.tape().is_empty());
    assert_eq!(ex.book(1).unwrap().best_bid(), Some((9_950, 100)));

    assert_eq!(
        ex.submit(MARKET_PARTICIPANT, &submit(0, Side::Buy, 9_990, 5, Lifespan::GoodForDay), 2)
            .map(|o| o.fills.len()),
        Ok(1)
    );
}
