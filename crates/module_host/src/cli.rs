//! Command-line interface for the module host.

use clap::{Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

pub const DEFAULT_CONFIG_PATH: &str = "module_host.toml";

/// Command line arguments parsed from user input.
///
/// Every option except `config_path` overrides the matching setting from the
/// configuration file when present.
#[derive(Debug, Clone, Default)]
pub struct CliArgs {
    /// Path to the configuration file
    pub config_path: PathBuf,
    /// Optional override for the module directory
    pub module_dir: Option<PathBuf>,
    /// Optional override for the log directory
    pub log_dir: Option<PathBuf>,
    /// Optional override for the log level
    pub log_level: Option<String>,
    /// Whether to force JSON log output
    pub json_logs: bool,
    /// Print the activation report as JSON on stdout
    pub report_json: bool,
    /// Keep modules loaded until a shutdown signal arrives
    pub stay_resident: bool,
}

impl CliArgs {
    /// Parses the process arguments, exiting with usage on error.
    pub fn parse() -> Self {
        Self::from_matches(&command().get_matches())
    }

    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            config_path: matches
                .get_one::<String>("config")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
            module_dir: matches.get_one::<String>("modules").map(PathBuf::from),
            log_dir: matches.get_one::<String>("logs").map(PathBuf::from),
            log_level: matches.get_one::<String>("log-level").cloned(),
            json_logs: matches.get_flag("json-logs"),
            report_json: matches.get_flag("report-json"),
            stay_resident: matches.get_flag("stay-resident"),
        }
    }
}

fn command() -> Command {
    Command::new("module_host")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Discovers and activates modules from a directory")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path")
                .default_value(DEFAULT_CONFIG_PATH),
        )
        .arg(
            Arg::new("modules")
                .short('m')
                .long("modules")
                .value_name("DIR")
                .help("Module directory path"),
        )
        .arg(
            Arg::new("logs")
                .long("logs")
                .value_name("DIR")
                .help("Log directory path"),
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
        .arg(
            Arg::new("report-json")
                .long("report-json")
                .help("Print the activation report as JSON")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new("stay-resident")
                .long("stay-resident")
                .help("Keep modules loaded until Ctrl+C")
                .action(ArgAction::SetTrue),
        )
}
