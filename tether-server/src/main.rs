//! tether-server - RFCOMM listener serving terminal sessions
//!
//! Accepts RFCOMM connections and, per the command line, bridges each
//! one to stdin/stdout, proxies it to a TCP target, or runs a command
//! on a pty with in-band window-size handling.

use clap::Parser;
use tracing::{error, info};

use tether_utils::{init_logging_with_config, rfcomm, LogConfig, Result};

mod cli;
mod session;

use cli::Args;

fn main() {
    let args = Args::parse();

    if let Err(e) = init_logging_with_config(LogConfig::server().with_verbosity(args.verbose)) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    if let Err(e) = run(&args) {
        error!("{}", e);
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let listener = rfcomm::Listener::bind(args.channel)?;
    info!("listening on RFCOMM channel {}", listener.channel());

    loop {
        let (conn, peer) = listener.accept()?;
        info!("{} client connected", peer);

        let outcome = if args.exec {
            session::run_exec(&conn, peer, &args.command).map(|code| {
                info!("{} child exit code {}", peer, code);
            })
        } else if let Some(target) = &args.target {
            session::run_proxy(&conn, target)
        } else {
            session::run_stdio(&conn)
        };

        // One bad session should not take the listener down.
        match outcome {
            Ok(()) => info!("{} disconnected", peer),
            Err(e) => error!("{} session failed: {}", peer, e),
        }
    }
}
