//! Match configuration.
//!
//! A match is described by a single JSON file: file paths, pacing, limits,
//! the instrument list and the credentialed teams. Everything except the
//! market data file and the instruments has a sensible default, so a minimal
//! config is a handful of lines.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use sim_core::{Instrument, Qty, ScoreParams};
use sim_protocol::MAX_NAME_LEN;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Full description of one match.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MatchConfig {
    /// Recorded market data to replay (CSV, `M` records).
    pub market_data_file: String,

    /// Audit log written during the match.
    #[serde(default = "default_events_file")]
    pub match_events_file: String,

    /// Final score board written at the close.
    #[serde(default = "default_score_file")]
    pub score_board_file: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Simulated time added per scheduler tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Spacing applied to market data records that carry no timestamps.
    #[serde(default = "default_tick_interval_ms")]
    pub market_event_interval_ms: u64,

    /// Wall-clock window for trader logins before the listener closes.
    #[serde(default = "default_login_window_ms")]
    pub login_window_ms: u64,

    /// Warm-up period after logins close and before the market opens.
    /// Orders queued during warm-up are applied at the open.
    #[serde(default = "default_open_delay_ms")]
    pub market_open_delay_ms: u64,

    /// Playback speed: 1.0 = real time, 2.0 = double speed, 0 = unpaced
    /// (each tick closes as soon as every session is ready).
    #[serde(default = "default_speed")]
    pub speed: f64,

    /// Wall-clock bound on each acceptance window.
    #[serde(default = "default_window_ms")]
    pub acceptance_window_ms: u64,

    /// Submits allowed per instrument per tick; 0 = unlimited.
    #[serde(default = "default_order_quota")]
    pub orders_per_instrument_per_tick: u32,

    /// Consecutive window timeouts before disqualification; 0 disables.
    #[serde(default = "default_timeout_threshold")]
    pub timeout_threshold: u32,

    /// Protocol violations before disqualification; 0 disables.
    #[serde(default = "default_violation_threshold")]
    pub violation_threshold: u32,

    /// Requests allowed per simulated second; 0 = unlimited.
    #[serde(default = "default_rate_limit")]
    pub message_rate_limit: u32,

    /// Absolute position limit in lots; 0 disables breach counting.
    #[serde(default = "default_position_limit")]
    pub position_limit: Qty,

    /// Score multiplier (per mille) applied to limit breachers.
    #[serde(default = "default_risk_penalty")]
    pub risk_penalty_per_mille: i64,

    /// Fee charged to the aggressor and rebated to the resting side, in
    /// basis points of traded value.
    #[serde(default)]
    pub taker_fee_bps: i64,

    pub instruments: Vec<Instrument>,

    /// Credentialed teams: name -> login secret. The match opens once every
    /// listed team is logged in, or when the login window lapses.
    pub traders: BTreeMap<String, String>,
}

fn default_events_file() -> String {
    "match_events.csv".to_string()
}

fn default_score_file() -> String {
    "score_board.csv".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    12345
}

fn default_tick_interval_ms() -> u64 {
    250
}

fn default_login_window_ms() -> u64 {
    5_000
}

fn default_open_delay_ms() -> u64 {
    1_000
}

fn default_speed() -> f64 {
    1.0
}

fn default_window_ms() -> u64 {
    200
}

fn default_order_quota() -> u32 {
    1
}

fn default_timeout_threshold() -> u32 {
    5
}

fn default_violation_threshold() -> u32 {
    50
}

fn default_rate_limit() -> u32 {
    50
}

fn default_position_limit() -> Qty {
    100
}

fn default_risk_penalty() -> i64 {
    1000
}

impl MatchConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: display.clone(),
            source,
        })?;
        let config: MatchConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: display,
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instruments.is_empty() {
            return Err(ConfigError::Invalid("no instruments configured".into()));
        }
        let mut seen = std::collections::BTreeSet::new();
        for instrument in &self.instruments {
            if instrument.id == 0 {
                return Err(ConfigError::Invalid(
                    "instrument id 0 is reserved".into(),
                ));
            }
            if !seen.insert(instrument.id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate instrument id {}",
                    instrument.id
                )));
            }
            if instrument.tick_size <= 0 || instrument.lot_size <= 0 {
                return Err(ConfigError::Invalid(format!(
                    "instrument {} has non-positive tick or lot size",
                    instrument.id
                )));
            }
        }

        if self.traders.is_empty() {
            return Err(ConfigError::Invalid("no traders configured".into()));
        }
        for name in self.traders.keys() {
            if name.is_empty() || name.len() > MAX_NAME_LEN || name.contains(',') {
                return Err(ConfigError::Invalid(format!("invalid team name {name:?}")));
            }
        }

        if self.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("tick_interval_ms must be > 0".into()));
        }
        if self.acceptance_window_ms > self.tick_interval_ms {
            return Err(ConfigError::Invalid(
                "acceptance_window_ms must not exceed tick_interval_ms".into(),
            ));
        }
        if !self.speed.is_finite() || self.speed < 0.0 {
            return Err(ConfigError::Invalid("speed must be finite and >= 0".into()));
        }
        if self.risk_penalty_per_mille < 0 || self.risk_penalty_per_mille > 1000 {
            return Err(ConfigError::Invalid(
                "risk_penalty_per_mille must be in 0..=1000".into(),
            ));
        }
        if self.position_limit < 0 || self.taker_fee_bps < 0 {
            return Err(ConfigError::Invalid(
                "position_limit and taker_fee_bps must be >= 0".into(),
            ));
        }
        Ok(())
    }

    pub fn score_params(&self) -> ScoreParams {
        ScoreParams {
            position_limit: self.position_limit,
            taker_fee_bps: self.taker_fee_bps,
            risk_penalty_per_mille: self.risk_penalty_per_mille,
        }
    }

    pub fn socket_addr_string(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}
