//! Command line arguments
//!
//! Global flags select configuration and logging; the subcommand selects
//! what to do with the broker. Without a subcommand the listener of
//! `--service` runs until a shutdown signal arrives.

use crate::core::config::{ConfigResult, GridConfig};
use crate::core::logging::LoggingOptions;
use crate::services::{QueueName, Service};
use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug, Clone)]
#[command(name = "crawlgrid")]
#[command(about = "Crawl pipeline service instance and queue maintenance")]
#[command(version)]
#[command(after_help = "Configuration keys use the grid.* names, e.g. -D grid.broker.threads=4")]
pub struct Args {
    /// Configuration file path
    #[arg(short = 'c', long = "config-file", value_name = "FILE", global = true)]
    pub config_file: Option<PathBuf>,

    /// Override a configuration value (repeatable)
    #[arg(short = 'D', value_name = "KEY=VALUE", action = ArgAction::Append, global = true)]
    pub defines: Vec<String>,

    /// Service this instance runs as
    #[arg(short = 's', long = "service", value_name = "SERVICE", global = true)]
    pub service: Option<Service>,

    /// Log level
    #[arg(short = 'l', long = "log-level", value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error", "off"], global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(short = 'o', long = "log-format", value_name = "FORMAT", value_parser = ["text", "ext", "json"], global = true)]
    pub log_format: Option<String>,

    /// Log file path (use 'none' to disable file logging)
    #[arg(short = 'f', long = "log-file", value_name = "FILE", global = true)]
    pub log_file: Option<String>,

    /// Force colored log output
    #[arg(long = "color", conflicts_with = "no_color", global = true)]
    pub color: bool,

    /// Disable colored log output
    #[arg(long = "no-color", global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run the listener of --service (default)
    Run,

    /// Put a message on a queue of --service
    Send {
        /// Target queue
        queue: QueueName,

        /// Thought as JSON; default is a single action for the target queue
        payload: Option<String>,
    },

    /// Show the number of waiting messages per source queue
    Status,

    /// Remove every message from a queue of --service
    Clear {
        /// Queue to clear
        queue: QueueName,
    },
}

impl Args {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run)
    }

    /// Configuration from the file (explicit or default location) with
    /// `-D` overrides applied on top
    pub fn resolve_config(&self) -> ConfigResult<GridConfig> {
        let mut config = match self.config_file.clone().or_else(GridConfig::default_path) {
            Some(path) => GridConfig::load(&path)?,
            None => GridConfig::new(),
        };
        for define in &self.defines {
            config.apply_override(define)?;
        }
        Ok(config)
    }

    pub fn logging_options(&self, is_terminal: bool) -> LoggingOptions {
        LoggingOptions {
            level: self.log_level.clone(),
            format: self.log_format.clone(),
            file: self.log_file.clone(),
            color: (self.color || is_terminal) && !self.no_color,
        }
    }
}
