//! nsp-canon CLI
//!
//! Command-line interface for validating and repackaging eShop NSP archives.

mod cli_types;
mod commands;
mod error;
mod logging;
mod spinner;

use clap::Parser;
use owo_colors::OwoColorize;
use owo_colors::Stream::Stderr;

use cli_types::{Cli, Commands, ConfigAction};
use commands::config::{run_config_path, run_config_show};
use commands::process::run_process;
use nsp_canon_lib::EXIT_SUCCESS;

fn main() {
    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.quiet, cli.verbose, cli.logfile.as_deref()) {
        eprintln!(
            "{} Cannot open log file: {}",
            "\u{2718}".if_supports_color(Stderr, |t| t.red()),
            e,
        );
        std::process::exit(nsp_canon_lib::EXIT_FAILURE);
    }

    let result = match cli.command {
        Some(Commands::Config { action }) => match action {
            ConfigAction::Show => run_config_show().map(|()| EXIT_SUCCESS),
            ConfigAction::Path => {
                run_config_path();
                Ok(EXIT_SUCCESS)
            }
        },
        None => run_process(cli.process, cli.quiet),
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            log::error!(
                "{} {}",
                "\u{2718}".if_supports_color(Stderr, |t| t.red()),
                e,
            );
            std::process::exit(e.exit_code());
        }
    }
}
