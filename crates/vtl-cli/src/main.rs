//! `vtl`: articulatory speech synthesis from the command line.
//!
//! Thin front end over the VocalTractLab binding in `lib-vtl-ffi`.

mod config;
mod orchestrator;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lib_vtl_ffi::Synthesizer;
use orchestrator::{Orchestrator, Task};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "vtl")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Output format
    #[arg(short, long, default_value = "text", global = true)]
    format: OutputFormat,

    /// Engine configuration file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the VocalTractLab API shared library
    #[arg(long, global = true)]
    library: Option<PathBuf>,

    /// Speaker file used to initialize the engine
    #[arg(long, global = true)]
    speaker: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert a segment sequence file into a gestural score
    PhonemesToGestures {
        /// Segment (phoneme/duration) sequence file
        phonemes: PathBuf,

        /// Gestural score file to write
        gestures: PathBuf,

        /// Let the engine print to the console
        #[arg(long)]
        verbose_api: bool,
    },

    /// Report the duration of a gestural score without synthesizing it
    Duration {
        /// Gestural score file
        gestures: PathBuf,
    },

    /// Compute the motor (tract sequence) trajectory of a gestural score
    GesturesToMotor {
        /// Gestural score file
        gestures: PathBuf,

        /// Tract sequence file to write
        motor: PathBuf,
    },

    /// Synthesize audio from a gestural score
    GesturesToAudio {
        /// Gestural score file
        gestures: PathBuf,

        /// WAV file to write
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Let the engine print to the console
        #[arg(long)]
        verbose_api: bool,
    },

    /// Show engine version and constants
    Info,
}

impl From<Commands> for Task {
    fn from(command: Commands) -> Self {
        match command {
            Commands::PhonemesToGestures { phonemes, gestures, verbose_api } => {
                Task::PhonemesToGestures { phonemes, gestures, verbose_api }
            }
            Commands::Duration { gestures } => Task::Duration { gestures },
            Commands::GesturesToMotor { gestures, motor } => Task::GesturesToMotor { gestures, motor },
            Commands::GesturesToAudio { gestures, output, verbose_api } => {
                Task::GesturesToAudio { gestures, output, verbose_api }
            }
            Commands::Info => Task::Info,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let file_config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from {:?}", path);
            Some(config::load_config(path)?)
        }
        None => None,
    };
    let engine_config = config::resolve_config(
        file_config,
        config::Overrides {
            library: cli.library,
            speaker_file: cli.speaker,
        },
    )?;

    tracing::debug!(?engine_config, "Resolved engine configuration");
    let synth = Synthesizer::from_config(engine_config)
        .context("Failed to load the VocalTractLab library")?;

    let report = Orchestrator::new(synth).run(cli.command.into())?;
    print!("{}", output::render(&report, cli.format)?);

    Ok(())
}
