//! Raw terminal mode management
//!
//! Session bytes flow through the terminal unmodified, so line
//! discipline and local echo must be off for the duration.

use std::io::{self, IsTerminal};

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};

use tether_utils::Result;

/// Puts the terminal into raw mode for the lifetime of the guard.
///
/// A non-tty stdin (piped input) is left alone.
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    pub fn new() -> Result<Self> {
        if !io::stdin().is_terminal() {
            return Ok(Self { active: false });
        }
        enable_raw_mode()?;
        Ok(Self { active: true })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = disable_raw_mode() {
                tracing::error!("Failed to restore terminal: {}", e);
            }
        }
    }
}
