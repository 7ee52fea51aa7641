//! aerosync CLI entry point
//!
//! Parses arguments, dispatches to `cli::run`, and exits non-zero on
//! failure. All logic lives in the CLI module.

use aerosync::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
