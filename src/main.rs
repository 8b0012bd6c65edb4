//! Threat model:
//! - The attacker can read/modify the encrypted archive.
//! - The attacker has unlimited offline time.
//! - The attacker does not have runtime access to the machine while a session is open.
//!
//! Design choices prioritize minimizing plaintext exposure and defensive parsing over convenience.

use clap::Parser;
use pwkeep::cli::Cli;
use pwkeep::repl;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match repl::run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
