//! tenant-backup CLI entry point
//!
//! This is a minimal entrypoint that:
//! 1. Dispatches to the CLI module (via cli::run)
//! 2. Prints errors to stderr
//! 3. Exits with non-zero on failure
//!
//! Configuration, wiring and the commands themselves live in the library.

use tenant_backup::cli;

fn main() {
    if let Err(e) = cli::run() {
        eprintln!("{}", e);
        std::process::exit(1);
    }
}
