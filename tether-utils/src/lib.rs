//! tether-utils: Common utilities shared across tether crates
//!
//! This crate provides:
//! - Unified error types ([`TetherError`], [`Result`])
//! - Logging infrastructure ([`init_logging`], [`LogConfig`])
//! - XDG-compliant path utilities ([`paths`] module)
//! - Bluetooth RFCOMM socket plumbing ([`rfcomm`] module)
//! - SIGWINCH-to-descriptor bridging ([`winch::SignalPipe`])

pub mod error;
pub mod logging;
pub mod paths;
pub mod rfcomm;
pub mod winch;

// Re-export main types at crate root for convenience
pub use error::{Result, TetherError};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogOutput};
pub use paths::log_dir;
pub use rfcomm::BtAddr;
pub use winch::SignalPipe;
