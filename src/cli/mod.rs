//! CLI module for aerosync
//!
//! Offline inspection of a data directory:
//! - status: counts of rows, metadata, pending changes and tokens
//! - pending: the pending-change queue
//! - metadata: per-record sync metadata
//! - verify: consistency checks over the sync store

mod args;
mod commands;
mod errors;
mod io;

pub use args::{Cli, Command};
pub use commands::{metadata, pending, run_command, status, verify_state};
pub use errors::{CliError, CliErrorCode, CliResult};
pub use io::{write_error, write_response};

/// Parse arguments and run the selected command
///
/// Failures are also reported as a JSON error object on stdout.
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    let result = run_command(cli.command);
    if let Err(e) = &result {
        write_error(e.code_str(), e.message())?;
    }
    result
}
