//! CLI argument definitions using clap.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use cgmsync_core::Backend;

#[derive(Debug, Parser)]
#[command(name = "cgmsync")]
#[command(author, version, about = "Sync glucose readings from Nightscout or LibreLinkUp", long_about = None)]
pub struct Cli {
    /// Also write logs to a daily rotating file in this directory
    #[arg(long, global = true, env = "CGMSYNC_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Backend selection shared by most commands
#[derive(Debug, Clone, Args)]
pub struct ServiceArgs {
    /// nightscout or librelinkup (defaults to the saved service)
    #[arg(short, long)]
    pub service: Option<Backend>,
}

impl ServiceArgs {
    pub fn resolve(&self, saved: Backend) -> Backend {
        self.service.unwrap_or(saved)
    }
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Enter credentials and verify them
    Login {
        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Forget the session and stored secrets
    Logout {
        /// Only this backend (default: both)
        #[arg(short, long)]
        service: Option<Backend>,
    },

    /// Run one sync cycle and print the readings
    Fetch {
        #[command(flatten)]
        service: ServiceArgs,

        /// Rows to print
        #[arg(short, long, default_value = "12")]
        limit: usize,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Sync periodically with a live countdown (type r + Enter to sync now)
    Watch {
        #[command(flatten)]
        service: ServiceArgs,
    },

    /// Print the cached reading history
    History {
        #[command(flatten)]
        service: ServiceArgs,

        /// Rows to print (0 for all)
        #[arg(short, long, default_value = "12")]
        limit: usize,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Switch the saved service between Nightscout and LibreLinkUp
    Toggle,

    /// Show configuration, session and cache state
    Status,
}
