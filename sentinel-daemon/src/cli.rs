//! CLI argument definitions for sentinel-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

/// Sentinel honeypot telemetry daemon.
///
/// Tails sensor logs into the event store, serves the query and replay API,
/// and relays the live feed.
#[derive(Parser, Debug)]
#[command(name = "sentinel-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to sentinel.toml configuration file.
    #[arg(short, long, default_value = "sentinel.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Override the API listen port.
    #[arg(long)]
    pub port: Option<u16>,

    /// Validate configuration file and exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_local_config_file() {
        let cli = DaemonCli::parse_from(["sentinel-daemon"]);
        assert_eq!(cli.config, PathBuf::from("sentinel.toml"));
        assert!(cli.log_level.is_none());
        assert!(!cli.validate);
    }

    #[test]
    fn parses_overrides() {
        let cli = DaemonCli::parse_from([
            "sentinel-daemon",
            "-c",
            "/etc/sentinel/sentinel.toml",
            "--log-level",
            "debug",
            "--log-format",
            "pretty",
            "--port",
            "8088",
            "--validate",
        ]);
        assert_eq!(cli.config, PathBuf::from("/etc/sentinel/sentinel.toml"));
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        assert_eq!(cli.log_format.as_deref(), Some("pretty"));
        assert_eq!(cli.port, Some(8088));
        assert!(cli.validate);
    }
}
