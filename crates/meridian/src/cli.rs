//! Command line interface for the server binary.

use clap::{Arg, ArgAction, Command};
use std::path::PathBuf;

/// Parsed command line arguments.
#[derive(Debug, Clone)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub bind_address: Option<String>,
    pub log_level: Option<String>,
    pub json_logs: bool,
}

impl CliArgs {
    /// Parses the process arguments.
    pub fn parse() -> Self {
        let matches = Command::new("Meridian Game Server")
            .version(env!("CARGO_PKG_VERSION"))
            .about("Networked message-processing server for multiplayer games")
            .arg(
                Arg::new("config")
                    .short('c')
                    .long("config")
                    .value_name("FILE")
                    .help("Configuration file path")
                    .default_value("meridian.toml"),
            )
            .arg(
                Arg::new("bind")
                    .short('b')
                    .long("bind")
                    .value_name("ADDRESS")
                    .help("Bind address (e.g., 127.0.0.1:8080)"),
            )
            .arg(
                Arg::new("log-level")
                    .short('l')
                    .long("log-level")
                    .value_name("LEVEL")
                    .help("Log level (trace, debug, info, warn, error)"),
            )
            .arg(
                Arg::new("json-logs")
                    .long("json-logs")
                    .help("Output logs in JSON format")
                    .action(ArgAction::SetTrue),
            )
            .get_matches();

        Self {
            config_path: PathBuf::from(
                matches
                    .get_one::<String>("config")
                    .expect("config has a default"),
            ),
            bind_address: matches.get_one::<String>("bind").cloned(),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
        }
    }
}
