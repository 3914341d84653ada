//! Agora CLI - drive the governance engine from the command line.
//!
//! Runs governance scenarios against an in-memory ledger and manages the
//! governor configuration file.

pub mod config;
pub mod output;
pub mod scenario;
pub mod telemetry;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use crate::config::AgoraConfig;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "agora")]
#[command(about = "Agora - multi-option on-chain governance")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    /// Config file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Log level, overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a scenario file
    Simulate {
        /// Scenario file (TOML)
        #[arg(value_name = "SCENARIO")]
        scenario: PathBuf,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the bundled bond scenario
    Demo {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(Subcommand, Debug)]
enum ConfigCommands {
    /// Write the default configuration
    Init {
        /// Output file
        #[arg(default_value = "agora.toml")]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Print the effective configuration
    Show,
}

fn main() {
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => AgoraConfig::from_file(path)?,
        None => AgoraConfig::default(),
    };
    config.validate()?;

    let level = cli.log_level.as_deref().unwrap_or(&config.logging.level);
    let json_logs = cli.json_logs || config.logging.format == "json";
    telemetry::init_telemetry(level, json_logs)?;

    match &cli.config {
        Some(path) => info!("Loaded configuration from {}", path.display()),
        None => info!("Using default configuration"),
    }

    match cli.command {
        Commands::Simulate { scenario, json } => {
            let parsed = scenario::Scenario::from_file(&scenario)?;
            let report = scenario::run_scenario(config.governor, &parsed)?;
            if json {
                output::print_json(&report)?;
            } else {
                output::print_report(&report);
                output::print_success(&format!("{} steps completed", report.steps));
            }
        }
        Commands::Demo { json } => {
            let parsed = scenario::Scenario::from_toml(scenario::BOND_SCENARIO)?;
            let report = scenario::run_scenario(config.governor, &parsed)?;
            if json {
                output::print_json(&report)?;
            } else {
                output::print_report(&report);
            }
        }
        Commands::Config(ConfigCommands::Init { path, force }) => {
            if path.exists() && !force {
                anyhow::bail!(
                    "'{}' already exists, pass --force to overwrite",
                    path.display()
                );
            }
            AgoraConfig::default().to_file(&path)?;
            output::print_success(&format!("Wrote {}", path.display()));
        }
        Commands::Config(ConfigCommands::Show) => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
