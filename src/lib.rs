// mfcc-cache - resumable MFCC feature cache for fold-partitioned audio corpora
// Module declarations

use clap::Parser;
use std::process::ExitCode;

pub mod audio;
pub mod cli;
pub mod config;
pub mod manifest;
pub mod pipeline;
pub mod state;

/// Entry point for the `mfcc-cache` binary
pub fn run() -> ExitCode {
    let cli = cli::Cli::parse();

    let default_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli::execute(&cli) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
