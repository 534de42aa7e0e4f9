//! # Milepost - Milestone Progression Server
//!
//! The main binary for the Milepost progression engine.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for progression operations
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │              apps/milepost (THE BINARY)          │
//! │                                                  │
//! │     ┌─────────────┐        ┌─────────────┐      │
//! │     │   CLI       │        │   HTTP API  │      │
//! │     │  (clap)     │        │   (axum)    │      │
//! │     └──────┬──────┘        └──────┬──────┘      │
//! │            │                      │             │
//! │            └──────────┬───────────┘             │
//! │                       ▼                         │
//! │              ┌─────────────────┐                │
//! │              │  milepost-core  │                │
//! │              │   (THE LOGIC)   │                │
//! │              └─────────────────┘                │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Start the HTTP server
//! milepost server --host 0.0.0.0 --port 8080
//!
//! # CLI operations
//! milepost create villa-101
//! milepost complete villa-101 site_visit
//! milepost percent villa-101 factory_production 60 --comment "frames done"
//! milepost show villa-101 --activity
//! ```

use clap::Parser;
use milepost::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Initialize tracing — MILEPOST_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("MILEPOST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "milepost=info,tower_http=debug".into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Display startup banner
    if !cli.quiet {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the Milepost startup banner.
fn print_banner() {
    println!(
        r#"
  ███╗   ███╗██╗██╗     ███████╗██████╗  ██████╗ ███████╗████████╗
  ████╗ ████║██║██║     ██╔════╝██╔══██╗██╔═══██╗██╔════╝╚══██╔══╝
  ██╔████╔██║██║██║     █████╗  ██████╔╝██║   ██║███████╗   ██║
  ██║╚██╔╝██║██║██║     ██╔══╝  ██╔═══╝ ██║   ██║╚════██║   ██║
  ██║ ╚═╝ ██║██║███████╗███████╗██║     ╚██████╔╝███████║   ██║
  ╚═╝     ╚═╝╚═╝╚══════╝╚══════╝╚═╝      ╚═════╝ ╚══════╝   ╚═╝

  Milestone Progression Server v{}

  Forward-only • Gated • Audited
"#,
        env!("CARGO_PKG_VERSION")
    );
}
