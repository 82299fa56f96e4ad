use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing::Level;

mod cli;
mod config;
mod report;
mod stages;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt().with_max_level(level).init();

    let outcome = config::Settings::from_cli(&cli).and_then(|settings| stages::run(&settings));
    match outcome {
        Ok(stages::Outcome::Passed) => {
            println!("{}", "All tests passed.".green().bold());
            ExitCode::SUCCESS
        }
        Ok(stages::Outcome::Failed) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}
