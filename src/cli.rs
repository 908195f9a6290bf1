//! Command-line interface for ClassArena
//!
//! Without `--headless` the binary loads the kits and layout, reports what a
//! host would get, and exits.

use clap::Parser;
use std::path::PathBuf;

/// Round-based class arena match core
#[derive(Parser, Debug)]
#[command(name = "classarena")]
#[command(about = "Round-based class arena match core")]
#[command(version)]
pub struct Args {
    /// Run a bot match in headless mode with the specified JSON config file
    #[arg(long, value_name = "CONFIG_FILE")]
    pub headless: Option<PathBuf>,

    /// Output path for match log (headless mode only)
    #[arg(long, value_name = "OUTPUT_PATH")]
    pub output: Option<PathBuf>,

    /// Maximum simulated match duration in seconds (headless mode only)
    #[arg(long)]
    pub max_duration: Option<f32>,

    /// Class kit file (RON) to use instead of the built-in kits
    #[arg(long, value_name = "CLASSES_FILE")]
    pub classes: Option<PathBuf>,

    /// Match settings file (RON)
    #[arg(long, value_name = "SETTINGS_FILE")]
    pub settings: Option<PathBuf>,

    /// Arena layout file (RON)
    #[arg(long, value_name = "LAYOUT_FILE")]
    pub layout: Option<PathBuf>,
}

pub fn parse_args() -> Args {
    Args::parse()
}
