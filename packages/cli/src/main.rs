#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line runner for the Cambridgeshire market pipeline.
//!
//! Each stage reads the previous stage's files, so stages can be run one at
//! a time or all in order. Without a subcommand an interactive menu picks
//! the stage.
//!
//! Uses `indicatif-log-bridge` (via [`cambs_market_cli_utils::init_logger`])
//! so log lines and progress bars share the terminal cleanly.

mod pipeline;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use cambs_market_cli_utils::MultiProgress;
use cambs_market_config::PipelineConfig;
use clap::{Parser, Subcommand};
use dialoguer::Select;

#[derive(Parser)]
#[command(
    name = "cambs_market",
    about = "Cambridgeshire brownfield development and market spend pipeline"
)]
struct Cli {
    /// Pipeline configuration file (defaults to the built-in configuration)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory that configured data and report paths are relative to
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Clone, Copy, Subcommand)]
enum Commands {
    /// Build the county boundary from parcel datasets and export it
    Boundary,
    /// Build the boundary and keep the brownfield sites inside it
    Sites,
    /// Reduce the national price-paid file to the county and date window
    Prices,
    /// Classify and aggregate the master sites into the market report
    Analyze,
    /// Draw the charts and the hotspot map from the report
    Visualize,
    /// Run every stage in order
    All,
}

impl Commands {
    const ALL: &[Self] = &[
        Self::All,
        Self::Boundary,
        Self::Sites,
        Self::Prices,
        Self::Analyze,
        Self::Visualize,
    ];

    #[must_use]
    const fn label(self) -> &'static str {
        match self {
            Self::All => "Run full pipeline",
            Self::Boundary => "Build county boundary",
            Self::Sites => "Filter brownfield sites",
            Self::Prices => "Filter price-paid data",
            Self::Analyze => "Analyse market",
            Self::Visualize => "Create charts and map",
        }
    }
}

fn main() -> ExitCode {
    let multi = cambs_market_cli_utils::init_logger();
    let cli = Cli::parse();

    match run(&cli, &multi) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
    let command = match cli.command {
        Some(command) => command,
        None => choose_command()?,
    };

    let config = PipelineConfig::load(cli.config.as_deref())?;
    let paths = config.resolve(&cli.root);
    let start = Instant::now();

    match command {
        Commands::Boundary => {
            pipeline::run_boundary(&config, &paths)?;
        }
        Commands::Sites => {
            let boundary = pipeline::run_boundary(&config, &paths)?;
            pipeline::run_sites(&paths, &boundary, multi)?;
        }
        Commands::Prices => pipeline::run_prices(&config, &paths, multi)?,
        Commands::Analyze => pipeline::run_analyze(&config, &paths)?,
        Commands::Visualize => pipeline::run_visualize(&config, &paths)?,
        Commands::All => pipeline::run_all(&config, &paths, multi)?,
    }

    log::info!(
        "{} finished in {:.1}s",
        command.label(),
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn choose_command() -> Result<Commands, dialoguer::Error> {
    println!("Cambridgeshire Market Pipeline");
    println!();

    let labels: Vec<&str> = Commands::ALL.iter().map(|c| c.label()).collect();
    let idx = Select::new()
        .with_prompt("What would you like to do?")
        .items(&labels)
        .default(0)
        .interact()?;

    Ok(Commands::ALL[idx])
}
