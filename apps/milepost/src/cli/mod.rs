//! # Milepost CLI Module
//!
//! This module implements the CLI interface for Milepost.
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `definitions` - Show the current definition set
//! - `init` - Persist the built-in pipeline as the definition set
//! - `create` - Create a progression record for a project
//! - `show` - Show a project's progression snapshot
//! - `complete` - Mark a binary sub-stage complete
//! - `percent` - Advance a percentage sub-stage
//! - `hold` - Change a project's hold status
//! - `projects` - List known projects
//!
//! CLI mutations run as a local Admin actor; role and permission gating is
//! for the HTTP surface, where the identity provider fronts the API.

mod commands;

use clap::{Parser, Subcommand};
use milepost_core::ProgressionError;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Milepost - Milestone Progression Server
///
/// A forward-only, gated, role-aware milestone engine for project pipelines.
/// Progress only ever moves forward; every transition is validated and logged.
#[derive(Parser, Debug)]
#[command(name = "milepost")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the progression database
    #[arg(short = 'D', long, global = true, default_value = "milepost.redb")]
    pub database: PathBuf,

    /// Storage backend: "redb" (ACID database) or "memory" (ephemeral)
    #[arg(short = 'B', long, global = true, default_value = "redb")]
    pub backend: String,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Show the current stage/sub-stage definitions
    Definitions,

    /// Persist the built-in pipeline as the stored definition set
    Init {
        /// Overwrite previously persisted definitions
        #[arg(short, long)]
        force: bool,
    },

    /// Create a progression record for a project entering the pipeline
    Create {
        /// Project identifier
        project: String,
    },

    /// Show a project's progression snapshot
    Show {
        /// Project identifier
        project: String,

        /// Include the full activity log
        #[arg(short, long)]
        activity: bool,
    },

    /// Mark a binary sub-stage complete
    Complete {
        /// Project identifier
        project: String,

        /// Sub-stage identifier
        sub_stage: String,
    },

    /// Advance a percentage sub-stage (100 auto-completes)
    Percent {
        /// Project identifier
        project: String,

        /// Sub-stage identifier
        sub_stage: String,

        /// New progress value, 0-100
        value: u8,

        /// Optional note recorded in the activity log
        #[arg(short, long)]
        comment: Option<String>,
    },

    /// Change a project's hold status
    Hold {
        /// Project identifier
        project: String,

        /// New status: active, hold, or deactivated
        status: String,
    },

    /// List known projects
    Projects,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), ProgressionError> {
    let backend = cli.backend.as_str();
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server { host, port }) => {
            cmd_server(&cli.database, backend, &host, port).await
        }
        Some(Commands::Definitions) => cmd_definitions(&cli.database, backend, json_mode),
        Some(Commands::Init { force }) => cmd_init(&cli.database, backend, force),
        Some(Commands::Create { project }) => {
            cmd_create(&cli.database, backend, json_mode, &project)
        }
        Some(Commands::Show { project, activity }) => {
            cmd_show(&cli.database, backend, json_mode, &project, activity)
        }
        Some(Commands::Complete { project, sub_stage }) => {
            cmd_complete(&cli.database, backend, json_mode, &project, &sub_stage)
        }
        Some(Commands::Percent {
            project,
            sub_stage,
            value,
            comment,
        }) => cmd_percent(
            &cli.database,
            backend,
            json_mode,
            &project,
            &sub_stage,
            value,
            comment,
        ),
        Some(Commands::Hold { project, status }) => {
            cmd_hold(&cli.database, backend, json_mode, &project, &status)
        }
        Some(Commands::Projects) => cmd_projects(&cli.database, backend, json_mode),
        None => {
            // No subcommand - show the definitions by default
            cmd_definitions(&cli.database, backend, json_mode)
        }
    }
}
