//! `ludics` operator CLI
//!
//! ```bash
//! ludics compile --moves log.json --scoping topic
//! ludics step --moves log.json --phase focus-P --fuel 64
//! ludics forest --moves log.json --config ludics.toml
//! ludics infer --commitments cs.json
//! ```
//!
//! Results go to stdout as JSON; logs go to stderr (`RUST_LOG` filters).

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ludics_cli::commands;
use ludics_cli::config::{load_engine_config, FlagOverrides};
use ludics_cli::input::{self, CommitmentFile};
use ludics_engine::{CompositionMode, LocusPath, LudicsEngine, Phase, ScopingStrategy, StepOptions};
use serde::Serialize;
use tracing::info;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML file overriding `LUDICS_*` environment settings
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Maximum pairs per traversal (overrides config)
    #[arg(long, global = true)]
    fuel: Option<usize>,

    /// Reject adjacent same-polarity acts while compiling
    #[arg(long, global = true, default_value_t = false)]
    enforce_alternation: bool,

    /// Save the final store to a RocksDB snapshot directory
    #[cfg(feature = "heavy-state")]
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args, Debug)]
struct MoveArgs {
    /// JSON move log
    #[arg(long)]
    moves: PathBuf,

    /// Dialogue id (defaults to the only one in the log)
    #[arg(long)]
    dialogue: Option<String>,

    /// legacy, topic or argument
    #[arg(long)]
    scoping: Option<ScopingStrategy>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rebuild designs from a move log
    Compile(MoveArgs),

    /// Compile, then play the current design pair
    Step {
        #[command(flatten)]
        input: MoveArgs,

        /// neutral, focus-P or focus-O
        #[arg(long, default_value = "neutral")]
        phase: Phase,

        /// assoc, partial or spiritual
        #[arg(long, default_value = "assoc")]
        composition: CompositionMode,

        /// Only play positive openers under this locus
        #[arg(long)]
        focus_at: Option<LocusPath>,

        /// Loci answered by a synthetic negative
        #[arg(long = "virtual", value_name = "LOCUS")]
        virtual_negatives: Vec<LocusPath>,

        /// Loci where a missing answer is a draw
        #[arg(long, value_name = "LOCUS")]
        draw_at: Vec<LocusPath>,

        /// Parents whose children match any sibling negative
        #[arg(long, value_name = "LOCUS")]
        mask_names_at: Vec<LocusPath>,
    },

    /// Compile, then traverse every scope
    Forest(MoveArgs),

    /// Derive consequences of commitment stores
    Infer {
        /// JSON commitment file
        #[arg(long)]
        commitments: PathBuf,

        /// Dialogue id (defaults to the file's, then "default")
        #[arg(long)]
        dialogue: Option<String>,
    },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{out}");
    Ok(())
}

#[cfg(feature = "heavy-state")]
async fn save_snapshot(cli: &Cli, engine: &LudicsEngine) -> Result<()> {
    let Some(dir) = &cli.snapshot else {
        return Ok(());
    };
    let snapshot = ludics_engine::state::RocksSnapshot::open(dir)
        .context(format!("Failed to open snapshot at {}", dir.display()))?;
    snapshot
        .save(engine.store())
        .await
        .context("Failed to save snapshot")
}

#[cfg(not(feature = "heavy-state"))]
async fn save_snapshot(_cli: &Cli, _engine: &LudicsEngine) -> Result<()> {
    Ok(())
}

async fn run(cli: &Cli) -> Result<()> {
    let scoping = match &cli.command {
        Command::Compile(args) | Command::Forest(args) => args.scoping,
        Command::Step { input, .. } => input.scoping,
        Command::Infer { .. } => None,
    };
    let flags = FlagOverrides {
        fuel: cli.fuel,
        scoping,
        enforce_alternation: cli.enforce_alternation,
    };
    let config = load_engine_config(cli.config.as_deref(), &flags)?;
    info!(
        fuel = config.default_fuel,
        scoping = %config.default_scoping,
        "ludics starting"
    );

    match &cli.command {
        Command::Compile(args) => {
            let moves = input::load_moves(&args.moves)?;
            let dialogue_id = input::dialogue_id(args.dialogue.as_deref(), &moves)?;
            let engine = commands::engine_for(moves, config);
            print_json(&commands::compile(&engine, &dialogue_id, args.scoping).await?)?;
            save_snapshot(cli, &engine).await
        }
        Command::Step {
            input: args,
            phase,
            composition,
            focus_at,
            virtual_negatives,
            draw_at,
            mask_names_at,
        } => {
            let moves = input::load_moves(&args.moves)?;
            let dialogue_id = input::dialogue_id(args.dialogue.as_deref(), &moves)?;
            let engine = commands::engine_for(moves, config);

            let mut options = StepOptions::new(&dialogue_id)
                .phase(*phase)
                .composition(*composition);
            options.fuel = cli.fuel;
            options.focus_at = focus_at.clone();
            options.virtual_negatives.extend(virtual_negatives.iter().cloned());
            options.draw_at.extend(draw_at.iter().cloned());
            options.mask_names_at.extend(mask_names_at.iter().cloned());

            print_json(&commands::step(&engine, &options, args.scoping).await?)?;
            save_snapshot(cli, &engine).await
        }
        Command::Forest(args) => {
            let moves = input::load_moves(&args.moves)?;
            let dialogue_id = input::dialogue_id(args.dialogue.as_deref(), &moves)?;
            let engine = commands::engine_for(moves, config);
            print_json(&commands::forest(&engine, &dialogue_id, args.scoping).await?)?;
            save_snapshot(cli, &engine).await
        }
        Command::Infer {
            commitments,
            dialogue,
        } => {
            let file = CommitmentFile::from_file(commitments)?;
            let dialogue_id = dialogue
                .clone()
                .or_else(|| file.dialogue_id.clone())
                .unwrap_or_else(|| "default".to_string());
            let engine = commands::engine_for(Vec::new(), config);
            print_json(&commands::infer(&engine, file, &dialogue_id).await?)?;
            save_snapshot(cli, &engine).await
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ludics=info,ludics_engine=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    run(&cli).await
}
