use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "autocrack", version, about = "Prepare an installed Steam title for offline play")]
pub struct Cli {
    #[arg(long, global = true, help = "Config file to use instead of the default location")]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Look up a title by name, or pass a numeric app id straight through
    Search {
        #[arg(required = true, num_args = 1..)]
        title: Vec<String>,
        #[arg(long, help = "Output machine-readable JSON")]
        json: bool,
    },
    /// Check a title for anti-tamper protection
    Check { app_id: String },
    /// Print the install directory of an installed title
    Locate {
        app_id: String,
        #[arg(long, help = "Steam installation to scan (defaults to the configured one)")]
        steam: Option<PathBuf>,
    },
    /// Run the patch tool against an install directory
    Apply {
        app_id: String,
        #[arg(long, help = "Game folder; discovered from Steam or prompted when omitted")]
        path: Option<PathBuf>,
        #[arg(long)]
        language: Option<String>,
    },
    /// Show or change the UI theme
    Theme { theme: Option<String> },
}
