use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{DEFAULT_CONFIG_PATH, Overrides};

#[derive(Parser, Debug)]
#[command(name = "hostwatch", version)]
#[command(about = "Single-host health check", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Skip the root privilege check
    #[arg(long)]
    pub no_root: bool,

    /// Append findings to the log file
    #[arg(long)]
    pub log: bool,

    /// Only show WARNING and CRITICAL findings on the console
    #[arg(short, long)]
    pub quiet: bool,

    /// CPU critical threshold in percent (warning is 10 below)
    #[arg(long, value_name = "N")]
    pub cpu_threshold: Option<f64>,

    /// Memory critical threshold in percent (warning is 10 below)
    #[arg(long, value_name = "N")]
    pub mem_threshold: Option<f64>,

    /// Disk critical threshold in percent (warning is 10 below)
    #[arg(long, value_name = "N")]
    pub disk_threshold: Option<f64>,

    /// Output format
    #[arg(short, long, default_value = "human")]
    pub format: OutputFormat,

    /// Verbose diagnostics on stderr
    #[arg(short, long)]
    pub verbose: bool,

    /// Config file path
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Validate the configuration file
    Validate,

    /// Write the default configuration
    Init {
        /// Force overwrite existing config
        #[arg(long)]
        force: bool,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

impl Cli {
    /// Help and version exit 0; anything unrecognised exits 1.
    pub fn parse_args() -> Self {
        match Cli::try_parse() {
            Ok(cli) => cli,
            Err(e) => {
                let code = if e.use_stderr() { 1 } else { 0 };
                let _ = e.print();
                std::process::exit(code);
            }
        }
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            cpu_threshold: self.cpu_threshold,
            mem_threshold: self.mem_threshold,
            disk_threshold: self.disk_threshold,
            log: self.log,
        }
    }
}
