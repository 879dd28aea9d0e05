//! CLI interface and argument parsing

pub mod commands;

use clap::{Parser, Subcommand};

/// Darwin Core Archive publisher
#[derive(Parser, Debug)]
#[command(name = "dwca-publisher")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "dwca-publisher.toml", env = "DWCA_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(short, long, env = "DWCA_LOG_LEVEL")]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build bundles from JSON-lines observations and publish the changed ones
    Publish(commands::publish::PublishArgs),

    /// Export a single bundle straight from the search backend
    Export(commands::export::ExportArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),

    /// Show publication records per source
    Status(commands::status::StatusArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}
