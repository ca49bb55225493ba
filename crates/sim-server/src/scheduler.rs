//! The tick scheduler.
//!
//! One task owns all match state: the exchange, the replayer, the score
//! keeper and the audit recorder. Sessions talk to it over a single mpsc
//! channel, so there is exactly one mutation order and a rerun with the
//! same inputs produces the same audit log byte for byte.
//!
//! Per tick:
//! 1. advance the simulated clock by `tick_interval_ms`
//! 2. if market data is due: reject stale requests (`WindowClosed`), apply
//!    and fan out the ticks, then hold an acceptance window until every
//!    active session has sent `Ready` or the wall deadline passes
//! 3. otherwise: drain and accept whatever arrived since the last window
//! 4. apply the batch grouped by ascending trader id, FIFO per trader
//! 5. if paced, sleep out the remainder of the tick's wall time
//!
//! Replayer exhaustion moves the match to `Closing` and then `Closed`;
//! requests still queued at `Closing` missed their window and are
//! rejected, never matched.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tokio::sync::watch;
use tokio::time::{sleep_until, Duration, Instant};
use tracing::{debug, info, warn};

use sim_core::{
    AuditEvent, CancelOrder, ClientOrderId, ErrorNotice, EventRecorder, Exchange, Fill,
    FillNotice, InstrumentId, MarketDataReplayer, MarketTick, MatchPhase, OrderAck, OrderId,
    OrderReject, OrderRequest, Price, RejectReason, ScoreKeeper, SimNanos, SubmitOrder,
    TraderId, TraderNotification, TraderScore, MARKET_PARTICIPANT,
};

use crate::config::MatchConfig;
use crate::types::{SchedulerRx, SessionHandle, SessionMsg};

const NANOS_PER_MILLI: u64 = 1_000_000;
const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Everything the match produced, for the caller to persist or assert on.
#[derive(Debug)]
pub struct MatchOutcome {
    pub ranking: Vec<TraderScore>,
    pub ticks_applied: usize,
    pub fills_recorded: u64,
}

/// Requests of one window, grouped for deterministic application.
type Batch = BTreeMap<TraderId, Vec<OrderRequest>>;

struct SessionState {
    handle: SessionHandle,
    active: bool,
    consecutive_timeouts: u32,
    violations: u32,
    rate_second: u64,
    rate_count: u32,
    quota_used: HashMap<InstrumentId, u32>,
}

pub struct MatchScheduler {
    cfg: MatchConfig,
    exchange: Exchange,
    replayer: MarketDataReplayer,
    scores: ScoreKeeper,
    sessions: BTreeMap<TraderId, SessionState>,
    inbound: SchedulerRx,
    recorder: Box<dyn EventRecorder + Send>,
    stop: watch::Receiver<bool>,
    now: SimNanos,
    last_mid: BTreeMap<InstrumentId, Price>,
    last_trade: BTreeMap<InstrumentId, Price>,
    disqualified: BTreeSet<TraderId>,
    ticks_applied: usize,
    fills_recorded: u64,
}

impl MatchScheduler {
    pub fn new(
        cfg: MatchConfig,
        replayer: MarketDataReplayer,
        handles: Vec<SessionHandle>,
        inbound: SchedulerRx,
        recorder: Box<dyn EventRecorder + Send>,
        stop: watch::Receiver<bool>,
    ) -> Self {
        let mut scores = ScoreKeeper::new(cfg.score_params());
        let mut sessions = BTreeMap::new();
        for handle in handles {
            scores.register(handle.trader_id);
            sessions.insert(
                handle.trader_id,
                SessionState {
                    handle,
                    active: true,
                    consecutive_timeouts: 0,
                    violations: 0,
                    rate_second: u64::MAX,
                    rate_count: 0,
                    quota_used: HashMap::new(),
                },
            );
        }
        let exchange = Exchange::new(cfg.instruments.clone());

        MatchScheduler {
            cfg,
            exchange,
            replayer,
            scores,
            sessions,
            inbound,
            recorder,
            stop,
            now: 0,
            last_mid: BTreeMap::new(),
            last_trade: BTreeMap::new(),
            disqualified: BTreeSet::new(),
            ticks_applied: 0,
            fills_recorded: 0,
        }
    }

    pub async fn run(mut self) -> MatchOutcome {
        info!(
            traders = self.sessions.len(),
            pending_ticks = self.replayer.remaining(),
            "match starting"
        );

        self.enter_phase(MatchPhase::WarmUp);
        let queued = self.warm_up().await;
        self.enter_phase(MatchPhase::Open);
        // Warm-up submissions land at the open, in trader-id order.
        self.apply_batch(queued);

        let tick_ns = self.cfg.tick_interval_ms * NANOS_PER_MILLI;
        while !self.replayer.is_exhausted() {
            if *self.stop.borrow() {
                info!("stop requested, closing early");
                break;
            }
            let started = Instant::now();
            self.now += tick_ns;
            self.reset_quotas();

            let due = self.replayer.pop_due(self.now);
            if due.is_empty() {
                let batch = self.drain_pending(true);
                self.apply_batch(batch);
            } else {
                self.drain_pending(false);
                for tick in &due {
                    self.apply_tick(tick);
                }
                let (batch, timed_out) = self.collect_window().await;
                self.apply_batch(batch);
                self.settle_timeouts(&timed_out);
            }

            if let Some(wall) = self.wall_for(self.cfg.tick_interval_ms) {
                sleep_until(started + wall).await;
            }
        }

        self.enter_phase(MatchPhase::Closing);
        // The last window has closed; anything still queued is late.
        self.drain_pending(false);
        self.close()
    }

    // ------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------

    fn enter_phase(&mut self, phase: MatchPhase) {
        self.record(AuditEvent::PhaseChange { phase });
        info!(phase = phase.as_str(), "phase change");
    }

    /// Collect warm-up submissions until the open. Nothing rests before the
    /// open, so cancels are rejected outright and submits are queued.
    async fn warm_up(&mut self) -> Batch {
        let mut queued = Batch::new();

        let delay = self
            .wall_for(self.cfg.market_open_delay_ms)
            .unwrap_or(Duration::from_millis(self.cfg.market_open_delay_ms));
        let deadline = Instant::now() + delay;
        loop {
            if *self.stop.borrow() {
                break;
            }
            let msg = tokio::select! {
                _ = sleep_until(deadline) => break,
                msg = self.inbound.recv() => msg,
            };
            match msg {
                Some(msg) => self.warm_up_msg(msg, &mut queued),
                None => break,
            }
        }
        while let Ok(msg) = self.inbound.try_recv() {
            self.warm_up_msg(msg, &mut queued);
        }
        queued
    }

    fn warm_up_msg(&mut self, msg: SessionMsg, queued: &mut Batch) {
        match msg {
            SessionMsg::Request { trader_id, request } => {
                if !self.session_active(trader_id) {
                    return;
                }
                match request {
                    OrderRequest::Submit(_) => {
                        queued.entry(trader_id).or_default().push(request)
                    }
                    OrderRequest::Cancel(_) => {
                        self.reject(trader_id, 0, RejectReason::UnknownOrder)
                    }
                }
            }
            SessionMsg::Ready { .. } => {}
            SessionMsg::Violation { trader_id, detail } => self.violation(trader_id, &detail),
            SessionMsg::Disconnected { trader_id } => self.drop_session(trader_id),
        }
    }

    fn close(mut self) -> MatchOutcome {
        let traders: Vec<TraderId> = self.sessions.keys().copied().collect();
        for trader in traders {
            for outcome in self.exchange.cancel_all(trader) {
                self.record(AuditEvent::OrderCancelled {
                    trader,
                    order_id: outcome.order_id,
                    instrument: outcome.instrument,
                    cancelled: outcome.cancelled,
                });
            }
        }
        self.enter_phase(MatchPhase::Closed);

        let mut marks: BTreeMap<InstrumentId, Price> = BTreeMap::new();
        for instrument in &self.cfg.instruments {
            let mark = self
                .last_mid
                .get(&instrument.id)
                .or_else(|| self.last_trade.get(&instrument.id));
            if let Some(&mark) = mark {
                marks.insert(instrument.id, mark);
            }
        }

        let names: BTreeMap<TraderId, String> = self
            .sessions
            .iter()
            .map(|(&id, state)| (id, state.handle.name.clone()))
            .collect();
        let ranking = self
            .scores
            .final_ranking(&marks, &names, &self.disqualified);

        info!(
            fills = self.fills_recorded,
            ticks = self.ticks_applied,
            "match closed"
        );
        MatchOutcome {
            ranking,
            ticks_applied: self.ticks_applied,
            fills_recorded: self.fills_recorded,
        }
    }

    // ------------------------------------------------------------------
    // Inbound collection
    // ------------------------------------------------------------------

    /// Hold the acceptance window open until every active session is ready
    /// or the wall deadline passes. Returns the collected batch and the
    /// sessions that never reported ready.
    async fn collect_window(&mut self) -> (Batch, BTreeSet<TraderId>) {
        let mut pending: BTreeSet<TraderId> = self
            .sessions
            .iter()
            .filter(|(_, state)| state.active)
            .map(|(&id, _)| id)
            .collect();
        let mut batch = Batch::new();

        let deadline = Instant::now() + self.window_wall();
        while !pending.is_empty() {
            // An operator stop abandons the in-flight window.
            let msg = tokio::select! {
                _ = sleep_until(deadline) => break,
                _ = self.stop.changed() => return (Batch::new(), BTreeSet::new()),
                msg = self.inbound.recv() => msg,
            };
            match msg {
                Some(SessionMsg::Request { trader_id, request }) => {
                    if self.session_active(trader_id) {
                        batch.entry(trader_id).or_default().push(request);
                    }
                }
                Some(SessionMsg::Ready { trader_id }) => {
                    pending.remove(&trader_id);
                }
                Some(SessionMsg::Violation { trader_id, detail }) => {
                    self.violation(trader_id, &detail);
                    if !self.session_active(trader_id) {
                        pending.remove(&trader_id);
                    }
                }
                Some(SessionMsg::Disconnected { trader_id }) => {
                    self.drop_session(trader_id);
                    pending.remove(&trader_id);
                }
                None => break,
            }
        }
        (batch, pending)
    }

    /// Non-blocking drain of the inbound channel. With `accept` the
    /// requests form a batch; without it they are late and get
    /// `WindowClosed`.
    fn drain_pending(&mut self, accept: bool) -> Batch {
        let mut batch = Batch::new();
        while let Ok(msg) = self.inbound.try_recv() {
            match msg {
                SessionMsg::Request { trader_id, request } => {
                    if !self.session_active(trader_id) {
                        continue;
                    }
                    if accept {
                        batch.entry(trader_id).or_default().push(request);
                    } else {
                        let client = client_of(&request);
                        self.reject(trader_id, client, RejectReason::WindowClosed);
                    }
                }
                SessionMsg::Ready { .. } => {}
                SessionMsg::Violation { trader_id, detail } => {
                    self.violation(trader_id, &detail)
                }
                SessionMsg::Disconnected { trader_id } => self.drop_session(trader_id),
            }
        }
        batch
    }

    fn settle_timeouts(&mut self, timed_out: &BTreeSet<TraderId>) {
        let ids: Vec<TraderId> = self.sessions.keys().copied().collect();
        for id in ids {
            if !self.session_active(id) {
                continue;
            }
            if timed_out.contains(&id) {
                let count = match self.sessions.get_mut(&id) {
                    Some(state) => {
                        state.consecutive_timeouts += 1;
                        state.consecutive_timeouts
                    }
                    None => continue,
                };
                debug!(trader = id, count, "acceptance window timeout");
                if self.cfg.timeout_threshold > 0 && count >= self.cfg.timeout_threshold {
                    self.disqualify(id, "consecutive acceptance window timeouts");
                }
            } else if let Some(state) = self.sessions.get_mut(&id) {
                state.consecutive_timeouts = 0;
            }
        }
    }

    // ------------------------------------------------------------------
    // Request application
    // ------------------------------------------------------------------

    fn apply_batch(&mut self, batch: Batch) {
        for (trader, requests) in batch {
            for request in requests {
                // A trader can be disqualified mid-batch.
                if !self.session_active(trader) {
                    break;
                }
                self.apply_request(trader, request);
            }
        }
    }

    fn apply_request(&mut self, trader: TraderId, request: OrderRequest) {
        if !self.admit(trader, &request) {
            return;
        }
        match request {
            OrderRequest::Submit(submit) => self.apply_submit(trader, submit),
            OrderRequest::Cancel(CancelOrder { order_id }) => {
                self.apply_cancel(trader, order_id)
            }
        }
    }

    /// Session-level guards: message rate per simulated second, then the
    /// per-instrument submit quota for this tick.
    fn admit(&mut self, trader: TraderId, request: &OrderRequest) -> bool {
        let second = self.now / NANOS_PER_SEC;
        let rate_limit = self.cfg.message_rate_limit;
        let quota = self.cfg.orders_per_instrument_per_tick;
        let client = client_of(request);

        let over_rate = match self.sessions.get_mut(&trader) {
            Some(state) => {
                if state.rate_second != second {
                    state.rate_second = second;
                    state.rate_count = 0;
                }
                state.rate_count += 1;
                rate_limit > 0 && state.rate_count > rate_limit
            }
            None => return false,
        };
        if over_rate {
            self.reject(trader, client, RejectReason::RateLimited);
            self.violation(trader, "message rate limit exceeded");
            return false;
        }

        if let OrderRequest::Submit(submit) = request {
            let over_quota = match self.sessions.get_mut(&trader) {
                Some(state) => {
                    let used = state.quota_used.entry(submit.instrument).or_insert(0);
                    if quota > 0 && *used >= quota {
                        true
                    } else {
                        *used += 1;
                        false
                    }
                }
                None => return false,
            };
            if over_quota {
                self.reject(trader, client, RejectReason::QuotaExceeded);
                return false;
            }
        }
        true
    }

    fn apply_submit(&mut self, trader: TraderId, submit: SubmitOrder) {
        let now = self.now;
        match self.exchange.submit(trader, &submit, now) {
            Ok(outcome) => {
                self.record(AuditEvent::OrderAccepted {
                    trader,
                    order_id: outcome.order_id,
                    client_order_id: submit.client_order_id,
                    instrument: submit.instrument,
                    side: submit.side,
                    price: submit.price,
                    quantity: submit.quantity,
                    remaining: outcome.remaining,
                });
                self.notify(
                    trader,
                    TraderNotification::OrderAck(OrderAck {
                        order_id: outcome.order_id,
                        client_order_id: submit.client_order_id,
                        instrument: submit.instrument,
                        remaining: outcome.remaining,
                    }),
                );
                self.emit_fills(&outcome.fills);
            }
            Err(reason) => self.reject(trader, submit.client_order_id, reason),
        }
    }

    fn apply_cancel(&mut self, trader: TraderId, order_id: OrderId) {
        match self.exchange.cancel(trader, order_id) {
            Ok(outcome) => {
                self.record(AuditEvent::OrderCancelled {
                    trader,
                    order_id: outcome.order_id,
                    instrument: outcome.instrument,
                    cancelled: outcome.cancelled,
                });
                self.notify(
                    trader,
                    TraderNotification::OrderAck(OrderAck {
                        order_id: outcome.order_id,
                        client_order_id: outcome.client_order_id,
                        instrument: outcome.instrument,
                        remaining: 0,
                    }),
                );
            }
            Err(reason) => self.reject(trader, 0, reason),
        }
    }

    fn apply_tick(&mut self, tick: &MarketTick) {
        match self.exchange.apply_market_tick(tick, self.now) {
            Ok(fills) => {
                if let Some(mid) = tick.mid_price() {
                    self.last_mid.insert(tick.instrument, mid);
                }
                self.emit_fills(&fills);
                self.ticks_applied += 1;
                for state in self.sessions.values() {
                    if state.active {
                        let _ = state
                            .handle
                            .tx
                            .send(TraderNotification::MarketTick(tick.clone()));
                    }
                }
            }
            Err(reason) => {
                warn!(instrument = tick.instrument, %reason, "dropping market data record")
            }
        }
    }

    fn emit_fills(&mut self, fills: &[Fill]) {
        for fill in fills {
            self.scores.on_fill(fill);
            self.last_trade.insert(fill.instrument, fill.price);
            self.fills_recorded += 1;
            self.record(AuditEvent::Fill(fill.clone()));

            if fill.aggressor_trader != MARKET_PARTICIPANT {
                self.notify(
                    fill.aggressor_trader,
                    TraderNotification::Fill(FillNotice {
                        order_id: fill.aggressor_order,
                        client_order_id: fill.aggressor_client,
                        instrument: fill.instrument,
                        side: fill.aggressor_side,
                        price: fill.price,
                        quantity: fill.quantity,
                        remaining: fill.aggressor_remaining,
                    }),
                );
            }
            if fill.resting_trader != MARKET_PARTICIPANT {
                self.notify(
                    fill.resting_trader,
                    TraderNotification::Fill(FillNotice {
                        order_id: fill.resting_order,
                        client_order_id: fill.resting_client,
                        instrument: fill.instrument,
                        side: fill.aggressor_side.opposite(),
                        price: fill.price,
                        quantity: fill.quantity,
                        remaining: fill.resting_remaining,
                    }),
                );
            }
        }
    }

    // ------------------------------------------------------------------
    // Session bookkeeping
    // ------------------------------------------------------------------

    fn session_active(&self, trader: TraderId) -> bool {
        self.sessions
            .get(&trader)
            .map(|state| state.active)
            .unwrap_or(false)
    }

    fn violation(&mut self, trader: TraderId, detail: &str) {
        let count = match self.sessions.get_mut(&trader) {
            Some(state) if state.active => {
                state.violations += 1;
                state.violations
            }
            _ => return,
        };
        warn!(trader, detail, count, "protocol violation");
        self.notify(
            trader,
            TraderNotification::Error(ErrorNotice {
                client_order_id: 0,
                message: detail.to_string(),
            }),
        );
        if self.cfg.violation_threshold > 0 && count >= self.cfg.violation_threshold {
            self.disqualify(trader, "protocol violations");
        }
    }

    /// Disconnect: open orders are pulled, but the trader stays in the
    /// ranking with whatever it accumulated.
    fn drop_session(&mut self, trader: TraderId) {
        let state = match self.sessions.get_mut(&trader) {
            Some(state) if state.active => state,
            _ => return,
        };
        state.active = false;
        info!(trader, "session disconnected");
        for outcome in self.exchange.cancel_all(trader) {
            self.record(AuditEvent::OrderCancelled {
                trader,
                order_id: outcome.order_id,
                instrument: outcome.instrument,
                cancelled: outcome.cancelled,
            });
        }
    }

    fn disqualify(&mut self, trader: TraderId, reason: &str) {
        if !self.disqualified.insert(trader) {
            return;
        }
        for outcome in self.exchange.cancel_all(trader) {
            self.record(AuditEvent::OrderCancelled {
                trader,
                order_id: outcome.order_id,
                instrument: outcome.instrument,
                cancelled: outcome.cancelled,
            });
        }
        self.record(AuditEvent::Disqualified {
            trader,
            reason: reason.to_string(),
        });
        self.notify(
            trader,
            TraderNotification::Error(ErrorNotice {
                client_order_id: 0,
                message: format!("disqualified: {reason}"),
            }),
        );
        if let Some(state) = self.sessions.get_mut(&trader) {
            state.active = false;
        }
        info!(trader, reason, "trader disqualified");
    }

    fn reject(&mut self, trader: TraderId, client_order_id: ClientOrderId, reason: RejectReason) {
        self.record(AuditEvent::OrderRejected {
            trader,
            client_order_id,
            reason,
        });
        self.notify(
            trader,
            TraderNotification::OrderReject(OrderReject {
                client_order_id,
                reason,
            }),
        );
    }

    fn notify(&self, trader: TraderId, notification: TraderNotification) {
        if let Some(state) = self.sessions.get(&trader) {
            let _ = state.handle.tx.send(notification);
        }
    }

    fn record(&mut self, event: AuditEvent) {
        self.recorder.record(self.now, &event);
    }

    fn reset_quotas(&mut self) {
        for state in self.sessions.values_mut() {
            state.quota_used.clear();
        }
    }

    // ------------------------------------------------------------------
    // Pacing
    // ------------------------------------------------------------------

    fn wall_for(&self, ms: u64) -> Option<Duration> {
        if self.cfg.speed > 0.0 {
            Some(Duration::from_secs_f64(ms as f64 / (1000.0 * self.cfg.speed)))
        } else {
            None
        }
    }

    /// The window deadline stays a wall bound even unpaced, so a stalled
    /// session cannot hang the match.
    fn window_wall(&self) -> Duration {
        self.wall_for(self.cfg.acceptance_window_ms)
            .unwrap_or(Duration::from_millis(self.cfg.acceptance_window_ms))
    }
}

fn client_of(request: &OrderRequest) -> ClientOrderId {
    match request {
        OrderRequest::Submit(submit) => submit.client_order_id,
        OrderRequest::Cancel(_) => 0,
    }
}
