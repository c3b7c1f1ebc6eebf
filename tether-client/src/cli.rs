//! Command-line argument parsing for the tether client
//!
//! Uses clap for argument parsing with derive macros.

use clap::Parser;

use tether_utils::BtAddr;

/// tether - bridge the local terminal to a remote RFCOMM peer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Bluetooth destination address (XX:XX:XX:XX:XX:XX)
    pub destination: BtAddr,

    /// RFCOMM channel on the destination
    #[arg(value_parser = clap::value_parser!(u8).range(1..=30))]
    pub channel: u8,

    /// Character that detaches the session when typed
    ///
    /// Caret notation (^A..^_, e.g. ^] for Ctrl-]) or a single literal
    /// character; "none" disables detaching.
    #[arg(long, env = "TETHER_ESCAPE", default_value = "^]", value_parser = parse_escape_char)]
    pub escape_char: EscapeChar,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// The session's detach byte, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscapeChar(pub Option<u8>);

fn parse_escape_char(s: &str) -> Result<EscapeChar, String> {
    if s.eq_ignore_ascii_case("none") {
        return Ok(EscapeChar(None));
    }
    match s.as_bytes() {
        [b] if b.is_ascii() => Ok(EscapeChar(Some(*b))),
        [b'^', c] if c.is_ascii() => {
            let c = c.to_ascii_uppercase();
            if (0x3F..=0x5F).contains(&c) {
                // ^? is DEL, ^@..^_ are the control range.
                Ok(EscapeChar(Some(c ^ 0x40)))
            } else {
                Err(format!("invalid caret escape {:?}", s))
            }
        }
        _ => Err(format!(
            "invalid escape character {:?} (caret notation like ^] or \"none\")",
            s
        )),
    }
}
