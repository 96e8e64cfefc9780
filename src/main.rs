mod cli;
mod commands;
mod config;
mod paths;
mod progress;
mod prompt;
mod request;
mod ui;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Command};
use config::{Config, Overrides};
use std::io;

/// Global context for the application
pub struct Context {
    pub verbose: u8,
    pub quiet: bool,
    pub config: Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };

    env_logger::Builder::new()
        .filter_level(if cli.quiet {
            log::LevelFilter::Error
        } else {
            log_level
        })
        .format_timestamp(None)
        .init();

    if let Command::Completions { shell } = cli.command {
        generate(shell, &mut Cli::command(), "fleetbook", &mut io::stdout());
        return Ok(());
    }

    let mut config = Config::load()?;
    config.apply(&Overrides {
        store: cli.store,
        roles_dir: cli.roles_dir,
        work_dir: cli.work_dir,
    });

    let ctx = Context {
        verbose: cli.verbose,
        quiet: cli.quiet,
        config,
    };

    match cli.command {
        Command::Run(args) => commands::run::run(&ctx, args),
        Command::Servers => commands::servers::run(&ctx),
        Command::Status(args) => commands::status::run(&ctx, args),
        Command::Catalog => commands::catalog::run(&ctx),
        Command::Init => commands::init::run(&ctx),
        Command::Completions { .. } => Ok(()),
    }
}
