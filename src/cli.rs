//! Command-line interface for sigo-voice
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Realtime voice assistant for the MICSA SIGO dashboard
#[derive(Parser, Debug)]
#[command(
    name = "sigo-voice",
    version,
    about = "Realtime voice assistant for the MICSA SIGO dashboard"
)]
pub struct Cli {
    /// Subcommand to execute (default: run)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Suppress status output (quiet mode)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug logs, -vv: trace logs)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start a voice session and talk to the assistant until Ctrl-C
    Run {
        /// Audio input device (e.g., hw:0)
        #[arg(long, value_name = "DEVICE")]
        device: Option<String>,

        /// Use a WAV file as the microphone instead of a device
        #[arg(long, value_name = "WAV")]
        input: Option<PathBuf>,

        /// Realtime endpoint URL (overrides config)
        #[arg(long, value_name = "URL")]
        url: Option<String>,
    },

    /// List available audio input devices
    Devices,

    /// Inspect configuration
    Config {
        /// Action to perform
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions
#[derive(Subcommand, Debug, PartialEq)]
pub enum ConfigAction {
    /// Print the effective configuration (file, defaults and environment)
    Show,
    /// Print the configuration file path
    Path,
}

impl Cli {
    /// Tracing filter directive for the requested verbosity.
    pub fn log_filter(&self) -> &'static str {
        if self.quiet {
            return "error";
        }
        match self.verbose {
            0 => "warn",
            1 => "sigo_voice=debug,info",
            _ => "sigo_voice=trace,debug",
        }
    }
}
