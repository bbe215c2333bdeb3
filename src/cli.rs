//! Uses clap to define the CLI interface declaratively.
use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// GPS receiver device path
    #[arg(short, long, value_name = "DEVICE")]
    pub gps: Option<PathBuf>,

    /// configuration file (.toml, .yaml, .yml or .json)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// poll timeout in milliseconds, -1 to block until ready
    #[arg(short, long, value_name = "MS", allow_negative_numbers = true)]
    pub timeout: Option<i32>,
}
