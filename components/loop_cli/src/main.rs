//! loopsim CLI
//!
//! Entry point for the scenario runner. Parses CLI arguments and delegates
//! to the library.

use clap::Parser as ClapParser;
use loop_cli::{trace, Cli};
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    trace::init_tracing(cli.verbose);

    let stdout = std::io::stdout();
    match loop_cli::run(&cli, &mut stdout.lock()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
