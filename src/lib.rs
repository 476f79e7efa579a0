pub mod chime;
pub mod cli;
mod commands;
pub mod db;
pub mod exit_codes;
pub mod export;
pub mod library;
pub mod models;
pub mod recording;
pub mod scanning;
pub mod settings;
mod utils;

use clap::Parser;

use cli::Cli;
use exit_codes::ExitCode;

/// Parse arguments, run the requested command and return its exit code.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    utils::logging::init(cli.verbosity());

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to create Tokio runtime: {err}");
            return ExitCode::GeneralError;
        }
    };

    runtime.block_on(commands::dispatch(cli))
}
