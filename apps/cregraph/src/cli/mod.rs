//! # CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP server
//! - `status` - Show collection status
//! - `init` - Initialize a new database
//! - `add-cre`, `add-standard` - Upsert entities
//! - `link-cres`, `link-standard` - Upsert links
//! - `show` - One CRE with its links and ancestors
//! - `search` - Free-text search
//! - `gap` - Gap analysis across standards
//! - `export` - Write one JSON file per document into a directory
//! - `import` - Load documents from a JSON file
//! - `hash` - BLAKE3 checksum of the exported document map

mod commands;

use crate::config::{Backend, Config};
use clap::{Parser, Subcommand};
use cregraph_core::{CregraphError, LinkType, StandardRef};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// cregraph - CRE and Standard link graph
///
/// Keeps the CRE hierarchy acyclic and answers search and gap-analysis queries.
#[derive(Parser, Debug)]
#[command(name = "cregraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only print results
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Path to the redb database
    #[arg(short = 'D', long, global = true)]
    pub database: Option<PathBuf>,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum)]
    pub backend: Option<Backend>,

    /// Configuration file (default: ./cregraph.toml when present)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,

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
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Show collection status
    Status,

    /// Initialize a new empty database
    Init {
        /// Overwrite an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Add or update a CRE
    AddCre {
        name: String,

        /// External id such as 123-456
        #[arg(long)]
        id: Option<String>,

        #[arg(short, long, default_value = "")]
        description: String,

        /// Comma-separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Add or update a Standard section
    AddStandard {
        name: String,
        section: String,

        #[arg(long, default_value = "")]
        subsection: String,

        #[arg(long = "standard-version", default_value = "")]
        version: String,

        #[arg(long, default_value = "")]
        hyperlink: String,

        /// Comma-separated tags
        #[arg(short, long, value_delimiter = ',')]
        tags: Vec<String>,
    },

    /// Link two CREs by external id
    LinkCres {
        group: String,
        member: String,

        /// Link type (contains, part-of, related, same)
        #[arg(short = 't', long, default_value = "Contains")]
        link_type: LinkType,
    },

    /// Link a CRE to a Standard section
    LinkStandard {
        /// CRE external id
        cre: String,
        name: String,
        section: String,

        #[arg(long, default_value = "")]
        subsection: String,

        #[arg(long = "standard-version", default_value = "")]
        version: String,

        /// Link type (same, related, ...)
        #[arg(short = 't', long, default_value = "SAME")]
        link_type: LinkType,
    },

    /// Show a CRE with its links and ancestors
    Show {
        /// CRE external id
        id: String,
    },

    /// Free-text search
    Search { text: String },

    /// Gap analysis across the named standards
    Gap {
        #[arg(required = true)]
        names: Vec<String>,
    },

    /// Export every document into a directory
    Export { dir: PathBuf },

    /// Import documents from a JSON file
    Import { file: PathBuf },

    /// Compute the BLAKE3 checksum of the exported document map
    Hash,
}

/// Resolved storage location and output options.
#[derive(Debug, Clone)]
pub struct Settings {
    pub database: PathBuf,
    pub backend: Backend,
    pub json_mode: bool,
    pub quiet: bool,
}

impl Settings {
    /// Merge the file configuration with explicit flags.
    fn resolve(cli: &Cli, config: &Config) -> Self {
        Self {
            database: cli
                .database
                .clone()
                .unwrap_or_else(|| config.storage.database.clone()),
            backend: cli.backend.unwrap_or(config.storage.backend),
            json_mode: cli.json_mode,
            quiet: cli.quiet,
        }
    }
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), CregraphError> {
    let config = Config::load(cli.config.as_deref())?;
    let settings = Settings::resolve(&cli, &config);
    if cli.verbose {
        tracing::info!(
            database = %settings.database.display(),
            backend = %settings.backend,
            "storage resolved"
        );
    }

    match cli.command {
        Some(Commands::Server { host, port }) => {
            let host = host.unwrap_or(config.server.host);
            let port = port.unwrap_or(config.server.port);
            cmd_server(&settings, &host, port).await
        }
        Some(Commands::Status) | None => cmd_status(&settings),
        Some(Commands::Init { force }) => cmd_init(&settings, force),
        Some(Commands::AddCre {
            name,
            id,
            description,
            tags,
        }) => cmd_add_cre(&settings, &name, id.as_deref(), &description, &tags),
        Some(Commands::AddStandard {
            name,
            section,
            subsection,
            version,
            hyperlink,
            tags,
        }) => cmd_add_standard(
            &settings,
            StandardArgs {
                name,
                section,
                subsection,
                version,
                hyperlink,
                tags,
            },
        ),
        Some(Commands::LinkCres {
            group,
            member,
            link_type,
        }) => cmd_link_cres(&settings, &group, &member, link_type),
        Some(Commands::LinkStandard {
            cre,
            name,
            section,
            subsection,
            version,
            link_type,
        }) => cmd_link_standard(
            &settings,
            &cre,
            StandardRef::Key {
                name,
                section,
                subsection,
                version,
            },
            link_type,
        ),
        Some(Commands::Show { id }) => cmd_show(&settings, &id),
        Some(Commands::Search { text }) => cmd_search(&settings, &text),
        Some(Commands::Gap { names }) => cmd_gap(&settings, &names),
        Some(Commands::Export { dir }) => cmd_export(&settings, &dir),
        Some(Commands::Import { file }) => cmd_import(&settings, &file),
        Some(Commands::Hash) => cmd_hash(&settings),
    }
}
