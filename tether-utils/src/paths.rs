//! Path utilities for tether
//!
//! Handles XDG Base Directory compliance for the few paths this tool
//! writes (log files).

use std::path::PathBuf;

use directories::ProjectDirs;

/// Application identifier for XDG directories
const APP_NAME: &str = "tether";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Get the state directory
///
/// Location: `$XDG_STATE_HOME/tether` or `~/.local/state/tether`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|p| p.state_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| std::env::temp_dir().join(APP_NAME))
}

/// Get the log directory
///
/// Location: `$XDG_STATE_HOME/tether/logs`
pub fn log_dir() -> PathBuf {
    state_dir().join("logs")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_dir_under_state_dir() {
        let log = log_dir();
        assert!(log.starts_with(state_dir()));
        assert!(log.ends_with("logs"));
    }
}
