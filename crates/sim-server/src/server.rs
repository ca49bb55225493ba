//! TCP listener and top-level match wiring.
//!
//! Run order:
//! 1. load the recorded market data and open the audit log
//! 2. accept trader logins until every configured team is in or the login
//!    window lapses
//! 3. assign trader ids in sorted team-name order, so a rerun with the same
//!    roster gets the same ids regardless of connect order
//! 4. spawn reader/writer tasks per session and hand everything to the
//!    scheduler
//! 5. write the score board when the match closes

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::{sleep_until, timeout, Duration, Instant};
use tracing::{info, warn};

use sim_core::{MarketDataReplayer, TraderId};
use sim_protocol::{binary_codec, csv_codec, WireEvent, WireRequest};

use crate::config::MatchConfig;
use crate::recorder::{write_score_board, FileEventRecorder};
use crate::scheduler::{MatchOutcome, MatchScheduler};
use crate::session;
use crate::types::SessionHandle;

const LOGIN_FRAME_TIMEOUT: Duration = Duration::from_secs(5);

/// Run one complete match.
pub async fn run(cfg: MatchConfig) -> Result<MatchOutcome> {
    let data = fs::read_to_string(&cfg.market_data_file)
        .with_context(|| format!("reading market data file {}", cfg.market_data_file))?;
    let ticks = csv_codec::parse_market_data(&data, cfg.market_event_interval_ms)?;
    if ticks.is_empty() {
        bail!("market data file {} contains no records", cfg.market_data_file);
    }
    let replayer = MarketDataReplayer::new(ticks);

    let recorder = FileEventRecorder::create(&cfg.match_events_file)
        .with_context(|| format!("creating audit log {}", cfg.match_events_file))?;

    let addr = cfg.socket_addr_string();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, teams = cfg.traders.len(), "listening for trader logins");

    let logins = accept_traders(&listener, &cfg).await?;
    drop(listener);

    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let mut handles = Vec::with_capacity(logins.len());
    for (idx, (name, stream)) in logins.into_iter().enumerate() {
        let trader_id = idx as TraderId + 1;
        let (read, mut write) = stream.into_split();

        let mut payload = Vec::new();
        binary_codec::encode_event(&WireEvent::LoginAck { trader_id }, &mut payload)
            .map_err(|err| anyhow::anyhow!("encoding login ack: {err}"))?;
        session::write_frame(&mut write, &payload)
            .await
            .with_context(|| format!("sending login ack to {name}"))?;

        let (note_tx, note_rx) = mpsc::unbounded_channel();
        tokio::spawn(session::run_reader(trader_id, read, inbound_tx.clone()));
        tokio::spawn(session::run_writer(trader_id, write, note_rx));
        info!(trader_id, team = %name, "session ready");
        handles.push(SessionHandle {
            trader_id,
            name,
            tx: note_tx,
        });
    }
    drop(inbound_tx);

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = stop_tx.send(true);
        }
    });

    let scheduler = MatchScheduler::new(
        cfg.clone(),
        replayer,
        handles,
        inbound_rx,
        Box::new(recorder),
        stop_rx,
    );
    let outcome = scheduler.run().await;

    write_score_board(Path::new(&cfg.score_board_file), &outcome.ranking)
        .with_context(|| format!("writing score board {}", cfg.score_board_file))?;
    info!(path = %cfg.score_board_file, "score board written");
    Ok(outcome)
}

/// Accept and authenticate logins until every configured team is connected
/// or the login window lapses. The map is keyed by team name, so iteration
/// order is the id-assignment order.
async fn accept_traders(
    listener: &TcpListener,
    cfg: &MatchConfig,
) -> Result<BTreeMap<String, TcpStream>> {
    let mut logins: BTreeMap<String, TcpStream> = BTreeMap::new();
    let deadline = Instant::now() + Duration::from_millis(cfg.login_window_ms.max(1));

    while logins.len() < cfg.traders.len() {
        let accepted = tokio::select! {
            _ = sleep_until(deadline) => break,
            accepted = listener.accept() => accepted,
        };
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };
        match handshake(stream, cfg).await {
            Ok((name, stream)) => {
                if logins.contains_key(&name) {
                    warn!(team = %name, %peer, "duplicate login dropped");
                    continue;
                }
                info!(team = %name, %peer, "trader logged in");
                logins.insert(name, stream);
            }
            Err(err) => warn!(%peer, %err, "login rejected"),
        }
    }

    if logins.is_empty() {
        bail!("no traders logged in before the open");
    }
    if logins.len() < cfg.traders.len() {
        warn!(
            connected = logins.len(),
            expected = cfg.traders.len(),
            "opening without the full roster"
        );
    }
    Ok(logins)
}

async fn handshake(mut stream: TcpStream, cfg: &MatchConfig) -> Result<(String, TcpStream)> {
    let frame = timeout(LOGIN_FRAME_TIMEOUT, session::read_frame(&mut stream))
        .await
        .context("login timed out")?
        .context("reading login frame")?
        .context("connection closed before login")?;

    let request = binary_codec::decode_request(&frame).context("decoding login frame")?;
    let WireRequest::Login(login) = request else {
        bail!("first frame was not a login");
    };
    match cfg.traders.get(&login.name) {
        Some(secret) if *secret == login.secret => Ok((login.name, stream)),
        _ => bail!("unknown team or bad secret"),
    }
}
