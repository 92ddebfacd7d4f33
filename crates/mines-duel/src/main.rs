//! MinesDuel headless host.
//!
//! Reads one command per line from stdin, forwards it to a [`DuelService`],
//! and prints every [`SessionEvent`] the service emits.  The grid itself is
//! not rendered.
//!
//! ```text
//! listen                     wait for a guest on the configured port
//! connect <ip>[:port]        dial a host
//! duel                       start (or accept) a duel
//! bye                        leave the duel
//! open|mark|explore <i>      act on cell i (row-major index)
//! new                        new local game
//! size <small|medium|large>  change preset
//! scores | reset-scores      show or clear the high score table
//! quit
//! ```
//!
//! # Architecture
//!
//! ```text
//! main()
//!  └─ load_config()           -- config.toml, defaults on first run
//!  └─ TomlHighScoreStore      -- highscores.toml next to it
//!  └─ DuelService::run        (Tokio task, owns the session)
//!  └─ stdin loop / event printer
//! ```

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mines_core::{BoardSize, DuelOutcome};
use mines_duel::application::duel_service::{DuelHandle, DuelService, DuelSettings};
use mines_duel::application::scores::HighScores;
use mines_duel::application::session::SessionEvent;
use mines_duel::infrastructure::storage::config::{self, AppConfig};
use mines_duel::infrastructure::storage::high_scores::{TomlHighScoreStore, HIGH_SCORES_FILE};

/// One parsed stdin line.
#[derive(Debug, Clone, PartialEq, Eq)]
enum HostCommand {
    Listen,
    Connect(SocketAddr),
    Duel,
    Bye,
    Open(usize),
    Mark(usize),
    Explore(usize),
    New,
    Size(BoardSize),
    Scores,
    ResetScores,
    Quit,
}

fn parse_command(line: &str, default_port: u16) -> Result<HostCommand, String> {
    let mut words = line.split_whitespace();
    let verb = words.next().unwrap_or_default();
    let arg = words.next();

    let index = |arg: Option<&str>| -> Result<usize, String> {
        arg.ok_or_else(|| format!("{verb} needs a cell index"))?
            .parse()
            .map_err(|_| format!("{verb}: cell index must be a number"))
    };

    match verb {
        "listen" => Ok(HostCommand::Listen),
        "connect" => {
            let target = arg.ok_or("connect needs an address")?;
            if let Ok(addr) = target.parse::<SocketAddr>() {
                return Ok(HostCommand::Connect(addr));
            }
            let ip: IpAddr = target.parse().map_err(|_| format!("invalid address {target:?}"))?;
            Ok(HostCommand::Connect(SocketAddr::new(ip, default_port)))
        }
        "duel" | "start" => Ok(HostCommand::Duel),
        "bye" => Ok(HostCommand::Bye),
        "open" => Ok(HostCommand::Open(index(arg)?)),
        "mark" => Ok(HostCommand::Mark(index(arg)?)),
        "explore" => Ok(HostCommand::Explore(index(arg)?)),
        "new" | "replay" => Ok(HostCommand::New),
        "size" => {
            let size = arg
                .ok_or("size needs small, medium, or large")?
                .parse::<BoardSize>()
                .map_err(|e| e.to_string())?;
            Ok(HostCommand::Size(size))
        }
        "scores" => Ok(HostCommand::Scores),
        "reset-scores" => Ok(HostCommand::ResetScores),
        "quit" | "exit" => Ok(HostCommand::Quit),
        "" => Err("empty command".to_string()),
        other => Err(format!("unknown command {other:?}")),
    }
}

fn seconds(d: Duration) -> String {
    format!("{:.1}s", d.as_secs_f64())
}

fn describe(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Status(text) => text.clone(),
        SessionEvent::PhaseChanged(phase) => format!("now {phase}"),
        SessionEvent::BoardReset { size } => format!("new board: {size}"),
        SessionEvent::BoardChanged { revealed, marked } => {
            format!("board: {revealed} revealed, {marked} marked")
        }
        SessionEvent::PeerProgress { revealed, marked } => {
            format!("peer: {revealed} revealed, {marked} marked")
        }
        SessionEvent::Countdown { remaining: 0 } => "go!".to_string(),
        SessionEvent::Countdown { remaining } => format!("starting in {remaining}"),
        SessionEvent::ClockTick { elapsed } => format!("clock {}", seconds(*elapsed)),
        SessionEvent::LocalGameOver { won: true, elapsed } => {
            format!("you cleared the board in {}", seconds(*elapsed))
        }
        SessionEvent::LocalGameOver { won: false, elapsed } => {
            format!("boom after {}", seconds(*elapsed))
        }
        SessionEvent::DuelFinished { outcome, own, peer } => {
            let verdict = match outcome {
                DuelOutcome::Won => "you won the duel",
                DuelOutcome::Lost => "you lost the duel",
                DuelOutcome::Unknown => "duel ended",
            };
            let time = |d: &Option<Duration>| d.map(seconds).unwrap_or_else(|| "-".to_string());
            format!("{verdict} (you {}, peer {})", time(own), time(peer))
        }
        SessionEvent::NewHighScore { size, elapsed_ms } => {
            format!("new high score on {}: {elapsed_ms} ms", size.name())
        }
    }
}

fn describe_scores(scores: &HighScores) -> String {
    BoardSize::ALL
        .iter()
        .map(|&size| match scores.get(size) {
            Some(ms) => format!("{}: {ms} ms", size.name()),
            None => format!("{}: -", size.name()),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sends one command to the service.  Returns `false` when the host should exit.
async fn dispatch(
    handle: &DuelHandle,
    command: HostCommand,
    listen_addr: SocketAddr,
) -> anyhow::Result<bool> {
    match command {
        HostCommand::Listen => handle.start_listening(listen_addr).await?,
        HostCommand::Connect(addr) => handle.connect(addr).await?,
        HostCommand::Duel => handle.start_duel().await?,
        HostCommand::Bye => handle.end_duel().await?,
        HostCommand::Open(i) => handle.open_cell(i).await?,
        HostCommand::Mark(i) => handle.mark_cell(i).await?,
        HostCommand::Explore(i) => handle.explore_cell(i).await?,
        HostCommand::New => handle.new_game().await?,
        HostCommand::Size(size) => handle.change_size(size).await?,
        HostCommand::Scores => println!("{}", describe_scores(&handle.high_scores().await?)),
        HostCommand::ResetScores => handle.reset_high_scores().await?,
        HostCommand::Quit => return Ok(false),
    }
    Ok(true)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (cfg, config_error) = match config::load_config() {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&cfg.game.log_level)),
        )
        .init();

    if let Some(e) = config_error {
        error!("{e}; using default configuration");
    }
    info!("MinesDuel starting");

    let listen_addr = cfg.duel.listen_addr().context("invalid [duel] bind_address")?;
    let scores_path = match config::config_dir() {
        Ok(dir) => dir.join(HIGH_SCORES_FILE),
        Err(e) => {
            warn!("{e}; keeping high scores in the working directory");
            PathBuf::from(HIGH_SCORES_FILE)
        }
    };
    let scores = TomlHighScoreStore::open(&scores_path)
        .with_context(|| format!("opening high scores at {}", scores_path.display()))?;

    let (service, handle, mut events) = DuelService::new(DuelSettings::from(&cfg), Box::new(scores));
    let service_task = tokio::spawn(service.run());

    println!("MinesDuel ready ({}). Type a command, or quit.", cfg.game.default_size);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line, cfg.duel.port) {
                    Ok(command) => {
                        if !dispatch(&handle, command, listen_addr).await? {
                            break;
                        }
                    }
                    Err(e) => println!("? {e}"),
                }
            }
            Some(event) = events.recv() => println!("{}", describe(&event)),
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    handle.shutdown().await.ok();
    service_task.await.ok();
    info!("MinesDuel stopped");
    Ok(())
}
