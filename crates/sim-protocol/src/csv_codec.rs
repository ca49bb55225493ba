//! CSV codecs for the three file formats around a match:
//!
//! - recorded market data (input): `M,<ts_ms>,<instrument>,<nbids>,<nasks>,
//!   <price>,<qty>,...` with bid levels first, then ask levels
//! - the audit log (output): single-letter event tag per line
//! - the final score board (output): one row per trader, best rank first
//!
//! All values are written as plain integers in minor currency units; no
//! floats touch these files, so a rerun diff is byte-exact.

use sim_core::{AuditEvent, MarketTick, ReplayError, TraderScore, MAX_DEPTH};

const NANOS_PER_MILLI: u64 = 1_000_000;

/// Parse a recorded market data file.
///
/// Blank lines and `#` comments are skipped. If every record carries a zero
/// timestamp the ticks are spaced `default_interval_ms` apart instead, so a
/// depth-only capture still replays on a clock.
pub fn parse_market_data(
    content: &str,
    default_interval_ms: u64,
) -> Result<Vec<MarketTick>, ReplayError> {
    let mut ticks = Vec::new();
    let mut all_zero = true;

    for (idx, raw) in content.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let tick = parse_line(line, line_no)?;
        if tick.timestamp != 0 {
            all_zero = false;
        }
        ticks.push(tick);
    }

    if all_zero {
        for (idx, tick) in ticks.iter_mut().enumerate() {
            tick.timestamp = (idx as u64 + 1) * default_interval_ms * NANOS_PER_MILLI;
        }
    }
    Ok(ticks)
}

fn parse_line(line: &str, line_no: usize) -> Result<MarketTick, ReplayError> {
    let malformed = |reason: &str| ReplayError::Malformed {
        line: line_no,
        reason: reason.to_string(),
    };

    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.first() != Some(&"M") {
        return Err(malformed("expected record tag 'M'"));
    }
    if fields.len() < 5 {
        return Err(malformed("expected ts, instrument, nbids, nasks"));
    }

    let ts_ms: u64 = fields[1].parse().map_err(|_| malformed("bad timestamp"))?;
    let instrument: u32 = fields[2].parse().map_err(|_| malformed("bad instrument"))?;
    let nbids: usize = fields[3].parse().map_err(|_| malformed("bad bid count"))?;
    let nasks: usize = fields[4].parse().map_err(|_| malformed("bad ask count"))?;
    if nbids > MAX_DEPTH || nasks > MAX_DEPTH {
        return Err(malformed("depth exceeds maximum"));
    }
    if fields.len() != 5 + (nbids + nasks) * 2 {
        return Err(malformed("level count does not match header"));
    }

    let mut levels = fields[5..].iter();
    let mut take_levels = |n: usize| -> Result<Vec<(i64, i64)>, ReplayError> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            let price: i64 = levels
                .next()
                .and_then(|f| f.parse().ok())
                .ok_or_else(|| malformed("bad price"))?;
            let qty: i64 = levels
                .next()
                .and_then(|f| f.parse().ok())
                .ok_or_else(|| malformed("bad quantity"))?;
            if price <= 0 || qty <= 0 {
                return Err(malformed("non-positive price or quantity"));
            }
            out.push((price, qty));
        }
        Ok(out)
    };
    let bids = take_levels(nbids)?;
    let asks = take_levels(nasks)?;

    Ok(MarketTick {
        instrument,
        timestamp: ts_ms * NANOS_PER_MILLI,
        bids,
        asks,
    })
}

/// Format one market data record back into its file representation.
pub fn format_market_data_line(tick: &MarketTick) -> String {
    let mut line = format!(
        "M,{},{},{},{}",
        tick.timestamp / NANOS_PER_MILLI,
        tick.instrument,
        tick.bids.len(),
        tick.asks.len()
    );
    for &(price, qty) in tick.bids.iter().chain(tick.asks.iter()) {
        line.push_str(&format!(",{price},{qty}"));
    }
    line
}

/// One audit log line, without the trailing newline.
///
/// Tags: `P` phase change, `O` order accepted, `R` order rejected, `F` fill,
/// `X` cancel, `D` disqualification.
pub fn format_audit_line(seq: u64, timestamp: u64, event: &AuditEvent) -> String {
    match event {
        AuditEvent::PhaseChange { phase } => {
            format!("P,{seq},{timestamp},{}", phase.as_str())
        }
        AuditEvent::OrderAccepted {
            trader,
            order_id,
            client_order_id,
            instrument,
            side,
            price,
            quantity,
            remaining,
        } => format!(
            "O,{seq},{timestamp},{trader},{order_id},{client_order_id},{instrument},{},{price},{quantity},{remaining}",
            side.as_char()
        ),
        AuditEvent::OrderRejected {
            trader,
            client_order_id,
            reason,
        } => format!(
            "R,{seq},{timestamp},{trader},{client_order_id},{}",
            reason.code()
        ),
        AuditEvent::Fill(fill) => format!(
            "F,{seq},{timestamp},{},{},{},{},{},{},{},{}",
            fill.instrument,
            fill.price,
            fill.quantity,
            fill.aggressor_trader,
            fill.aggressor_order,
            fill.resting_trader,
            fill.resting_order,
            fill.aggressor_side.as_char()
        ),
        AuditEvent::OrderCancelled {
            trader,
            order_id,
            instrument,
            cancelled,
        } => format!("X,{seq},{timestamp},{trader},{order_id},{instrument},{cancelled}"),
        AuditEvent::Disqualified { trader, reason } => {
            format!("D,{seq},{timestamp},{trader},{reason}")
        }
    }
}

/// Header row of the score board file.
pub fn score_board_header() -> &'static str {
    "rank,trader_id,name,realized,unrealized,fees,score,risk_breaches,disqualified"
}

/// One score board row, matching [`score_board_header`].
pub fn format_score_line(row: &TraderScore) -> String {
    format!(
        "{},{},{},{},{},{},{},{},{}",
        row.rank,
        row.trader_id,
        row.name,
        row.realized,
        row.unrealized,
        row.fees,
        row.score,
        row.risk_breaches,
        if row.disqualified { "DQ" } else { "OK" }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::MatchPhase;

    #[test]
    fn parses_timestamped_records() {
        let data = "\
# instrument 1, two bid levels, one ask level
M,1500,1,2,1,9900,50,9800,100,10000,30
M,2000,2,0,1,10100,25
";
        let ticks = parse_market_data(data, 250).unwrap();
        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].timestamp, 1500 * NANOS_PER_MILLI);
        assert_eq!(ticks[0].bids, vec![(9900, 50), (9800, 100)]);
        assert_eq!(ticks[0].asks, vec![(10000, 30)]);
        assert_eq!(ticks[1].instrument, 2);
        assert!(ticks[1].bids.is_empty());
    }

    #[test]
    fn zero_timestamps_are_spaced_by_default_interval() {
        let data = "M,0,1,1,1,9900,10,10000,10\nM,0,1,1,1,9900,10,10100,10\n";
        let ticks = parse_market_data(data, 250).unwrap();
        assert_eq!(ticks[0].timestamp, 250 * NANOS_PER_MILLI);
        assert_eq!(ticks[1].timestamp, 500 * NANOS_PER_MILLI);
    }

    #[test]
    fn malformed_lines_carry_their_line_number() {
        let data = "M,100,1,1,1,9900,10,10000,10\nM,200,1,3,0,9900,10\n";
        let err = parse_market_data(data, 250).unwrap_err();
        let ReplayError::Malformed { line, .. } = err;
        assert_eq!(line, 2);
    }

    #[test]
    fn rejects_excess_depth_and_bad_levels() {
        let six = "M,100,1,6,0,1,1,2,1,3,1,4,1,5,1,6,1";
        assert!(parse_market_data(six, 250).is_err());
        let negative = "M,100,1,1,0,-50,10";
        assert!(parse_market_data(negative, 250).is_err());
    }

    #[test]
    fn market_data_round_trips_through_format() {
        let line = "M,1500,1,2,1,9900,50,9800,100,10000,30";
        let ticks = parse_market_data(line, 250).unwrap();
        assert_eq!(format_market_data_line(&ticks[0]), line);
    }

    #[test]
    fn audit_lines_use_stable_tags() {
        let phase = format_audit_line(1, 0, &AuditEvent::PhaseChange { phase: MatchPhase::Open });
        assert_eq!(phase, "P,1,0,OPEN");

        let dq = format_audit_line(
            9,
            5_000,
            &AuditEvent::Disqualified {
                trader: 3,
                reason: "consecutive timeouts".to_string(),
            },
        );
        assert_eq!(dq, "D,9,5000,3,consecutive timeouts");
    }

    #[test]
    fn score_line_matches_header_arity() {
        let row = TraderScore {
            rank: 1,
            trader_id: 2,
            name: "alpha".to_string(),
            realized: 150,
            unrealized: -20,
            fees: 5,
            score: 125,
            risk_breaches: 0,
            disqualified: false,
        };
        let line = format_score_line(&row);
        assert_eq!(
            line.split(',').count(),
            score_board_header().split(',').count()
        );
        assert_eq!(line, "1,2,alpha,150,-20,5,125,0,OK");
    }
}
