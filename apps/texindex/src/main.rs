//! # texindex - Texture Reference Index
//!
//! The main binary for the texindex texture reference index.
//!
//! This application provides:
//! - CLI interface for listing, exporting and editing texture references
//! - Scene manifests standing in for a live host
//! - File watching (notify-based) feeding the index's ingest path
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                 apps/texindex (THE BINARY)                 │
//! │                                                            │
//! │  ┌─────────────┐    ┌─────────────┐    ┌──────────────┐   │
//! │  │    CLI      │    │  Manifest   │    │   Watcher    │   │
//! │  │   (clap)    │    │   (serde)   │    │   (notify)   │   │
//! │  └──────┬──────┘    └──────┬──────┘    └──────┬───────┘   │
//! │         └──────────────────┼──────────────────┘           │
//! │                            ▼                              │
//! │                   ┌─────────────────┐                     │
//! │                   │  texindex-core  │                     │
//! │                   │   (THE INDEX)   │                     │
//! │                   └─────────────────┘                     │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! texindex --scene shot.json status
//! texindex --scene shot.json list --sort count --desc --filter "wood*"
//! texindex --scene shot.json repoint wood sourceimages/oak.png --propagate all
//! texindex --scene shot.json export -o report.csv
//! texindex --scene shot.json watch
//! ```

use clap::Parser;
use texindex::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    // Initialize tracing. TEXINDEX_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("TEXINDEX_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let default_filter = if cli.verbose {
        "texindex=debug,texindex_core=debug"
    } else {
        "texindex=info,texindex_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }

    // Display startup banner
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Print the texindex startup banner.
fn print_banner() {
    eprintln!(
        r#"
  ▀█▀ █▀▀ ▀▄▀ █ █▄ █ █▀▄ █▀▀ ▀▄▀
   █  ██▄ █ █ █ █ ▀█ █▄▀ ██▄ █ █

  Texture Reference Index v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
