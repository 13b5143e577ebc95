//! Runtime configuration assembled from the command line.

use std::path::PathBuf;

use badnews_core::Paths;
use tracing::Level;

/// Default listen address handed to the web front end.
pub const DEFAULT_ADDR: &str = "[::1]:4711";

/// The resolved configuration of one daemon run.
#[derive(Debug, Clone)]
pub struct Config {
    pub paths: Paths,
    /// Listen address for the HTTP front end (an external collaborator;
    /// carried here, not served by this process).
    pub addr: String,
    pub log_level: Level,
    pub flush_caches: bool,
    pub reader_count: usize,
    pub run_bee: bool,
    pub run_sleuth: bool,
}

/// The default base directory: `~/.badnews`, or `./badnews` when no home
/// directory can be determined.
pub fn default_base_dir() -> PathBuf {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".badnews"))
        .unwrap_or_else(|| PathBuf::from("badnews"))
}

/// Map the user-facing level names onto tracing's levels. CRITICAL has
/// no tracing counterpart and folds into ERROR.
pub fn parse_level(s: &str) -> Option<Level> {
    match s.to_ascii_uppercase().as_str() {
        "TRACE" => Some(Level::TRACE),
        "DEBUG" => Some(Level::DEBUG),
        "INFO" => Some(Level::INFO),
        "WARN" => Some(Level::WARN),
        "ERROR" | "CRITICAL" => Some(Level::ERROR),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_names_round_trip() {
        assert_eq!(parse_level("TRACE"), Some(Level::TRACE));
        assert_eq!(parse_level("debug"), Some(Level::DEBUG));
        assert_eq!(parse_level("Info"), Some(Level::INFO));
        assert_eq!(parse_level("WARN"), Some(Level::WARN));
        assert_eq!(parse_level("ERROR"), Some(Level::ERROR));
        assert_eq!(parse_level("CRITICAL"), Some(Level::ERROR));
        assert_eq!(parse_level("VERBOSE"), None);
    }
}
