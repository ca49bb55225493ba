//! Audit event model and the recorder seam.
//!
//! The audit trail is the canonical record of a match: every accepted order,
//! fill, cancel, rejection, disqualification and phase change, tagged with a
//! monotonic sequence number and the simulated timestamp. The scheduler is
//! the only writer; reporting and visualisation consume the log externally,
//! so the sink is a trait rather than a concrete file.

use crate::error::RejectReason;
use crate::messages::{Fill, MatchPhase};
use crate::side::Side;
use crate::{ClientOrderId, InstrumentId, OrderId, Price, Qty, SimNanos, TraderId};

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditEvent {
    PhaseChange {
        phase: MatchPhase,
    },
    OrderAccepted {
        trader: TraderId,
        order_id: OrderId,
        client_order_id: ClientOrderId,
        instrument: InstrumentId,
        side: Side,
        price: Price,
        quantity: Qty,
        remaining: Qty,
    },
    OrderRejected {
        trader: TraderId,
        client_order_id: ClientOrderId,
        reason: RejectReason,
    },
    Fill(Fill),
    OrderCancelled {
        trader: TraderId,
        order_id: OrderId,
        instrument: InstrumentId,
        cancelled: Qty,
    },
    Disqualified {
        trader: TraderId,
        reason: String,
    },
}

/// Write-only audit sink. Implementations assign the monotonic sequence
/// number themselves so the log stays gap-free however it is stored.
pub trait EventRecorder {
    fn record(&mut self, timestamp: SimNanos, event: &AuditEvent);
}

/// In-memory recorder for tests and for capturing a match programmatically.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    next_seq: u64,
    events: Vec<(u64, SimNanos, AuditEvent)>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        MemoryRecorder {
            next_seq: 1,
            events: Vec::new(),
        }
    }

    pub fn events(&self) -> &[(u64, SimNanos, AuditEvent)] {
        &self.events
    }
}

impl EventRecorder for MemoryRecorder {
    fn record(&mut self, timestamp: SimNanos, event: &AuditEvent) {
        let seq = self.next_seq.max(1);
        self.next_seq = seq + 1;
        self.events.push((seq, timestamp, event.clone()));
    }
}
