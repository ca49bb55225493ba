//! Shared types wiring trader sessions to the scheduler.
//!
//! - `SessionHandle`: the scheduler's send-side view of one logged-in trader
//! - `SessionMsg`: everything a session task can report inbound
//! - channel aliases for both directions

use sim_core::{OrderRequest, TraderId, TraderNotification};
use tokio::sync::mpsc;

/// Outbound notifications to one trader session.
pub type NotificationTx = mpsc::UnboundedSender<TraderNotification>;
pub type NotificationRx = mpsc::UnboundedReceiver<TraderNotification>;

/// Inbound messages from all sessions into the scheduler.
pub type SchedulerTx = mpsc::UnboundedSender<SessionMsg>;
pub type SchedulerRx = mpsc::UnboundedReceiver<SessionMsg>;

/// The scheduler's handle on a logged-in trader.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub trader_id: TraderId,
    pub name: String,
    pub tx: NotificationTx,
}

/// Message flowing from a session task into the scheduler.
#[derive(Debug)]
pub enum SessionMsg {
    /// An order request pulled off the wire.
    Request {
        trader_id: TraderId,
        request: OrderRequest,
    },
    /// The session finished its batch for the current acceptance window.
    Ready { trader_id: TraderId },
    /// A protocol violation (undecodable frame, login replay, ...).
    Violation { trader_id: TraderId, detail: String },
    /// The connection dropped; the session is gone for good.
    Disconnected { trader_id: TraderId },
}
