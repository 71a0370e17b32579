use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "setting-manager", about = "Inspect and change runtime settings")]
pub struct Cli {
    /// Manager configuration (TOML). Defaults apply when omitted.
    #[arg(long, env = "SETTING_MANAGER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Settings schema (TOML, JSON or YAML).
    #[arg(long, env = "SETTING_MANAGER_SCHEMA", default_value = "settings_schema.toml")]
    pub schema: PathBuf,

    /// Role used for permission checks.
    #[arg(long, env = "SETTING_MANAGER_ROLE", default_value = "operator")]
    pub role: String,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List every setting grouped by section.
    List {
        #[arg(long)]
        reveal: bool,
    },
    Get {
        name: String,
        #[arg(long)]
        reveal: bool,
    },
    /// Persist an override. Strings may be given bare; lists and objects as JSON.
    Set { name: String, value: String },
    Reset { name: String },
    ResetAll,
    /// Delete stored overrides for settings the schema no longer declares.
    Sweep,
    /// Reload periodically and print changes until interrupted.
    Watch {
        /// Defaults to `reload.interval_secs`, then 5.
        #[arg(long)]
        interval_secs: Option<u64>,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
