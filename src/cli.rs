//! CLI argument definitions for the loghook binary.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::config::RelayConfig;

/// Stateless syslog-to-webhook relay.
///
/// Accepts RFC 6587 octet-counted syslog over TCP, matches each
/// message against configured regex rules, and posts webhook
/// notifications for every match.
#[derive(Parser, Debug)]
#[command(name = "loghook")]
#[command(version, about, long_about = None)]
pub struct RelayCli {
    /// Path to the JSON configuration file.
    #[arg(short, long, default_value = "/config/config.json")]
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

    /// Force test mode on, regardless of the config file.
    #[arg(long)]
    pub test_mode: bool,

    /// Validate the configuration file and exit without starting the relay.
    #[arg(long)]
    pub validate: bool,
}

impl RelayCli {
    /// Apply CLI overrides on top of a loaded configuration.
    pub fn apply_overrides(&self, config: &mut RelayConfig) {
        if let Some(level) = &self.log_level {
            config.log.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.log.format = format.clone();
        }
        if self.test_mode {
            config.test_mode = true;
        }
    }
}
