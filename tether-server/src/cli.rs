//! Command-line argument parsing for the tether listener

use clap::Parser;

/// tether-server - serve terminal sessions to RFCOMM peers
///
/// Without -t or -e, accepted connections are bridged to this
/// process's stdin/stdout.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// RFCOMM channel to listen on
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=30))]
    pub channel: u8,

    /// Proxy accepted connections to a TCP target (host:port, [v6]:port)
    #[arg(short, long, conflicts_with = "exec")]
    pub target: Option<String>,

    /// Run the trailing command on a pty for each connection
    ///
    /// "{addr}" in the command arguments is replaced with the peer
    /// address.
    #[arg(short, long, requires = "command")]
    pub exec: bool,

    /// Command line for --exec
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, requires = "exec")]
    pub command: Vec<String>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
