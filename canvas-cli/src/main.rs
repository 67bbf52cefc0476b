//! Canvas CLI: drive a persisted canvas session from the shell.
//!
//! ```text
//! canvas show
//! canvas move <node> <x> <y> [<node> <x> <y> ...]
//! canvas connect <source> <target> [handle]
//! canvas disconnect <edge>
//! canvas reset
//! canvas recover
//! ```
//!
//! Logging via `RUST_LOG`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use canvas_core::{Edge, PositionChange};
use canvas_sync::{CanvasSession, RocksStore, SessionConfig, StoreConfig, ViewState};

#[derive(Parser, Debug)]
#[command(name = "canvas")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Edit a persisted node canvas from the shell")]
struct Cli {
    /// RocksDB directory holding the canvas slot
    #[arg(long, env = "CANVAS_DATA", default_value = "canvas_data")]
    data: PathBuf,

    /// Quiet window before a save, in milliseconds
    #[arg(long, env = "CANVAS_DEBOUNCE_MS")]
    debounce_ms: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the render view
    Show,
    /// Move nodes, given as `<node> <x> <y>` triples
    Move {
        #[arg(num_args = 3.., required = true, allow_negative_numbers = true)]
        changes: Vec<String>,
    },
    /// Connect two nodes
    Connect {
        source: String,
        target: String,
        /// Output handle on the source node
        handle: Option<String>,
    },
    /// Remove an edge by id
    Disconnect { edge: String },
    /// Clear the slot and start from the seed layout
    Reset,
    /// Quarantine an unreadable slot and start from the seed layout
    Recover,
}

impl Cli {
    fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::default();
        if let Some(ms) = self.debounce_ms {
            config.scheduler.debounce = Duration::from_millis(ms);
        }
        config
    }
}

fn position_changes(args: &[String]) -> Result<Vec<PositionChange>> {
    if args.len() % 3 != 0 {
        bail!("move takes <node> <x> <y> triples, got {} arguments", args.len());
    }
    args.chunks(3)
        .map(|c| {
            let x = coordinate(&c[1])?;
            let y = coordinate(&c[2])?;
            Ok(PositionChange::new(c[0].clone(), x, y))
        })
        .collect()
}

fn coordinate(raw: &str) -> Result<f64> {
    let value: f64 = raw.parse().with_context(|| format!("bad coordinate: {raw}"))?;
    if !value.is_finite() {
        bail!("coordinate must be finite: {raw}");
    }
    Ok(value)
}

fn edge(source: &str, target: &str, handle: Option<String>) -> Edge {
    let edge = Edge::new(format!("e{source}-{target}"), source, target);
    match handle {
        Some(handle) => edge.with_source_handle(handle),
        None => edge,
    }
}

fn print_view(session: &CanvasSession) -> Result<()> {
    match session.view() {
        ViewState::Loading => println!("loading"),
        ViewState::Ready(view) => println!("{}", serde_json::to_string_pretty(&view)?),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let config = cli.session_config();
    let command = cli.command.unwrap_or(Commands::Show);
    let changes = match &command {
        Commands::Move { changes } => position_changes(changes)?,
        _ => Vec::new(),
    };

    let store = RocksStore::open(StoreConfig::at(&cli.data))
        .with_context(|| format!("opening store at {}", cli.data.display()))?;
    let mut session = CanvasSession::new(Arc::new(store), config);

    let recovering = matches!(command, Commands::Recover);
    match session.load().await {
        Err(e) if recovering && e.is_corrupt() => {}
        Err(e) if e.is_corrupt() => {
            bail!("{e}\nthe stored canvas cannot be read; run `canvas recover` to start over")
        }
        Err(e) => return Err(e.into()),
        Ok(_) if recovering => info!("Slot is readable; recovering anyway"),
        Ok(outcome) => info!("Loaded canvas ({outcome:?})"),
    }

    match command {
        Commands::Show => {}
        Commands::Move { .. } => {
            let outcome = session.apply_changes(&changes)?;
            for id in &outcome.skipped {
                eprintln!("no such node: {id}");
            }
        }
        Commands::Connect { source, target, handle } => {
            session.connect(edge(&source, &target, handle))?
        }
        Commands::Disconnect { edge } => {
            if !session.disconnect(&edge)? {
                eprintln!("no such edge: {edge}");
            }
        }
        Commands::Reset => session.reset().await?,
        Commands::Recover => session.recover_fresh().await?,
    }

    print_view(&session)?;

    let status = session.save_status();
    session.shutdown().await?;
    if let Some(err) = status.last_error {
        log::warn!("Last save failed: {err}");
    }
    Ok(())
}
