//! Exchange simulator server binary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use sim_protocol::csv_codec;
use sim_server::config::MatchConfig;
use sim_server::server;

#[derive(Debug, Parser)]
#[command(
    name = "sim-server",
    about = "Deterministic exchange simulator for trading competitions"
)]
struct Args {
    /// Match configuration file (JSON).
    config: PathBuf,

    /// Run unpaced: each tick closes as soon as every trader is ready.
    #[arg(long)]
    fast: bool,

    /// Playback speed multiplier (1.0 = real time). Overrides the config.
    #[arg(long)]
    speed: Option<f64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut cfg = match MatchConfig::load(&args.config) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitCode::from(2);
        }
    };
    if args.fast {
        cfg.speed = 0.0;
    } else if let Some(speed) = args.speed {
        cfg.speed = speed.max(0.0);
    }

    match server::run(cfg).await {
        Ok(outcome) => {
            println!("{}", csv_codec::score_board_header());
            for row in &outcome.ranking {
                println!("{}", csv_codec::format_score_line(row));
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("match failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}
