use clap::Parser;

mod cli;
mod commands;

use cli::{Cli, Command};

const SUCCESS: i32 = 0;
const EXECUTION_ERROR: i32 = 1;

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    let result = match cli.command {
        Command::Run(args) => commands::run(args),
        Command::Inspect(args) => commands::inspect(args),
        Command::Synth(args) => commands::synth(args),
    };

    let exit_code = match result {
        Ok(()) => SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            EXECUTION_ERROR
        }
    };

    std::process::exit(exit_code);
}
