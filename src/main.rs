mod cli;
mod collector;
mod commands;
mod config;
mod error;
mod evaluator;
mod finding;
mod policy;
mod probe;
mod reporter;
mod sample;

use std::{
    io::{self, IsTerminal},
    process::ExitCode,
    sync::Arc,
};

use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, ConfigCommands};
use config::Config;
use evaluator::Evaluator;
use policy::ThresholdPolicy;
use probe::{HostProbe, SystemProbe};
use reporter::Reporter;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "hostwatch=debug" } else { "warn" };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();
}

fn run(cli: Cli) -> Result<ExitCode> {
    let mut stdout = io::stdout().lock();

    // Handle subcommands
    if let Some(Commands::Config { command }) = &cli.command {
        match command {
            ConfigCommands::Show => commands::config::show_config(&cli.config, &mut stdout)?,
            ConfigCommands::Validate => {
                if !commands::config::validate_config(&cli.config, &mut stdout)? {
                    return Ok(ExitCode::FAILURE);
                }
            }
            ConfigCommands::Init { force } => {
                commands::config::init_config(&cli.config, *force, &mut stdout)?
            }
        }
        return Ok(ExitCode::SUCCESS);
    }

    let mut config = Config::load(&cli.config)?;
    config.apply(&cli.overrides());
    config.validate()?;

    if !cli.no_root && !is_root() {
        eprintln!("hostwatch must run as root to read every log and service state.");
        eprintln!("Re-run with sudo, or pass --no-root to accept partial results.");
        return Ok(ExitCode::FAILURE);
    }

    let probe: Arc<dyn HostProbe> =
        Arc::new(SystemProbe::new(config.collection.command_timeout())?);
    let evaluator = Evaluator::new(
        collector::default_sources(probe, &config),
        ThresholdPolicy::from_config(&config),
    );

    let color = io::stdout().is_terminal();
    let mut reporter = Reporter::new(stdout, io::stderr(), cli.format)
        .quiet(cli.quiet)
        .color(color);
    if config.logging.enabled {
        reporter = reporter.log_to(&config.logging.path);
    }

    let findings = evaluator.run();
    reporter.emit(&findings)?;

    Ok(ExitCode::SUCCESS)
}

fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}
