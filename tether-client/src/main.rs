//! tether client - interactive RFCOMM terminal bridge
//!
//! Connects the local terminal to a remote RFCOMM peer, with window
//! sizes carried in-band and an escape character to detach.

use clap::Parser;

use tether_utils::{init_logging_with_config, LogConfig};

mod cli;
mod session;
mod terminal;

use cli::Args;

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging_with_config(LogConfig::client().with_verbosity(args.verbose)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
    tracing::info!("tether client starting");

    match session::run(&args) {
        Ok(()) => {
            // Raw mode is restored by the time the session returns.
            eprintln!("Disconnected.");
        }
        Err(e) => {
            tracing::error!("session failed: {}", e);
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
