//! Error taxonomy for the simulation core.
//!
//! Per-order rejections are values, not failures: they are returned
//! synchronously to the submitting trader and never interrupt the match.
//! Only configuration and data-source problems (handled in the server
//! crate) are fatal.

use thiserror::Error;

/// Why an order request was rejected.
///
/// Every variant is local to the submitting trader; other sessions and the
/// scheduler are unaffected.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum RejectReason {
    #[error("price is not a positive multiple of the instrument tick size")]
    InvalidTick,

    #[error("quantity is not a positive multiple of the instrument lot size")]
    InvalidLotSize,

    #[error("order would match against the trader's own resting order")]
    SelfMatch,

    #[error("request arrived outside the acceptance window")]
    WindowClosed,

    #[error("no such order for this trader")]
    UnknownOrder,

    #[error("no such instrument")]
    UnknownInstrument,

    #[error("per-instrument order quota for this tick already used")]
    QuotaExceeded,

    #[error("session message rate limit exceeded")]
    RateLimited,
}

impl RejectReason {
    /// Stable short code used in the audit log.
    pub fn code(self) -> &'static str {
        match self {
            RejectReason::InvalidTick => "INVALID_TICK",
            RejectReason::InvalidLotSize => "INVALID_LOT_SIZE",
            RejectReason::SelfMatch => "SELF_MATCH",
            RejectReason::WindowClosed => "WINDOW_CLOSED",
            RejectReason::UnknownOrder => "UNKNOWN_ORDER",
            RejectReason::UnknownInstrument => "UNKNOWN_INSTRUMENT",
            RejectReason::QuotaExceeded => "QUOTA_EXCEEDED",
            RejectReason::RateLimited => "RATE_LIMITED",
        }
    }
}

/// A malformed market data record. Raised while loading the recorded tick
/// file, before the match starts, so it is always fatal.
#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("market data line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}
