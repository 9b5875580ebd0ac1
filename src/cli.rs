//! Command-line interface parsing for MGNREGA Dash
//!
//! The binary serves the dashboard API by default. Two maintenance
//! subcommands run the resolver once or list stale districts. Global flags
//! override the matching environment variables.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use thiserror::Error;

use crate::config::Config;
use crate::data::DistrictId;

/// Error types for CLI argument parsing
#[derive(Debug, Error)]
pub enum CliError {
    /// District ids are opaque but never blank
    #[error("Invalid district: '{0}'. Expected a catalog id such as 'lucknow' or 'sant_kabir_nagar'")]
    InvalidDistrict(String),
}

/// MGNREGA Dash - district employment statistics with offline fallback
#[derive(Parser, Debug)]
#[command(name = "mgnrega-dash")]
#[command(about = "Serve MGNREGA district performance data with a local cache")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Listen address for `serve` (overrides BIND_ADDR)
    #[arg(long, global = true, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Cache database file (overrides DATABASE_PATH)
    #[arg(long, global = true, value_name = "PATH")]
    pub database: Option<PathBuf>,

    /// District catalog JSON (overrides DISTRICTS_FILE)
    #[arg(long, global = true, value_name = "PATH")]
    pub catalog: Option<PathBuf>,

    /// Emit logs as JSON lines (overrides LOG_JSON)
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,

    /// Resolve one district and print the response body
    ///
    /// Exits with status 2 when no data is available.
    Resolve {
        #[arg(value_parser = parse_district_arg)]
        district: DistrictId,
    },

    /// List districts whose newest cached row is older than the freshness window
    Stale {
        /// Age threshold in hours (defaults to CACHE_EXPIRY_HOURS)
        #[arg(long, value_name = "HOURS")]
        older_than_hours: Option<u32>,
    },
}

/// Parses a district id argument, trimming surrounding whitespace
pub fn parse_district_arg(s: &str) -> Result<DistrictId, CliError> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed.contains('/') {
        return Err(CliError::InvalidDistrict(s.to_string()));
    }
    Ok(DistrictId::new(trimmed))
}

impl Cli {
    /// The subcommand to run; bare invocation serves
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Serve)
    }

    /// Applies flag overrides on top of the environment-derived config
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(bind) = &self.bind {
            config.bind_addr = bind.clone();
        }
        if let Some(database) = &self.database {
            config.database_path = database.clone();
        }
        if let Some(catalog) = &self.catalog {
            config.catalog_path = catalog.clone();
        }
        if self.log_json {
            config.log_json = true;
        }
        config
    }
}
