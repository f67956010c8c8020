//! # cregraph
//!
//! The main binary for the CRE link graph.
//!
//! This application provides:
//! - HTTP REST API server (axum-based)
//! - CLI interface for upserts, links, search, gap analysis and export
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │             apps/cregraph (THE BINARY)       │
//! │                                              │
//! │   ┌─────────────┐        ┌─────────────┐     │
//! │   │    CLI      │        │  HTTP API   │     │
//! │   │   (clap)    │        │   (axum)    │     │
//! │   └──────┬──────┘        └──────┬──────┘     │
//! │          └───────────┬──────────┘            │
//! │                      ▼                       │
//! │              ┌───────────────┐               │
//! │              │ cregraph-core │               │
//! │              └───────────────┘               │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! cregraph server --host 0.0.0.0 --port 8080
//! cregraph add-cre "Authentication" --id 123-456
//! cregraph add-standard ASVS V2 --subsection 2.1
//! cregraph link-standard 123-456 ASVS V2 --subsection 2.1
//! cregraph search "CRE:123-456"
//! cregraph gap ASVS "OWASP Top 10"
//! ```

use clap::Parser;
use cregraph::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

#[tokio::main]
async fn main() {
    // CREGRAPH_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("CREGRAPH_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cregraph=info,tower_http=debug".into());

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

    let cli = cli::Cli::parse();

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}
