//! Command-line arguments for the muxd server binary.

use clap::Parser;
use std::path::PathBuf;

/// URL multiplexer: accepts a list of URLs per request and fetches them
/// concurrently under a bounded connection budget.
#[derive(Debug, Parser)]
#[command(name = "muxd", version, about)]
pub struct Args {
    /// Path to the TOML config file (default: XDG config dir).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override the configured HTTP port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Log to stderr instead of the state-dir log file.
    #[arg(long)]
    pub log_stderr: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_overrides() {
        let args = Args::parse_from(["muxd", "--port", "9999", "--log-stderr"]);
        assert_eq!(args.port, Some(9999));
        assert!(args.log_stderr);
        assert!(args.config.is_none());
    }

    #[test]
    fn defaults_to_no_overrides() {
        let args = Args::parse_from(["muxd"]);
        assert_eq!(args.port, None);
        assert!(!args.log_stderr);
    }
}
