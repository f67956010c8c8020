//! # CLI Command Implementations

use super::Settings;
use crate::api;
use crate::config::Backend;
use cregraph_core::{
    Collection, CreDraft, CreFilter, CreRecord, CreRef, CregraphError, Document, LinkOutcome,
    LinkType, StandardDraft, StandardRef, export_file_name,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum file size for import (100 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 100 * 1024 * 1024;

fn validate_file_size(path: &Path, max_size: u64) -> Result<(), CregraphError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| CregraphError::IoError(format!("Cannot read file metadata: {e}")))?;

    if metadata.len() > max_size {
        return Err(CregraphError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {max_size} bytes",
            metadata.len()
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, CregraphError> {
    let canonical = path.canonicalize().map_err(|e| {
        CregraphError::IoError(format!("Invalid file path '{}': {e}", path.display()))
    })?;

    if !canonical.is_file() {
        return Err(CregraphError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }
    Ok(canonical)
}

/// Create the export directory if needed and return its canonical form.
fn validate_output_dir(dir: &Path) -> Result<PathBuf, CregraphError> {
    std::fs::create_dir_all(dir).map_err(|e| {
        CregraphError::IoError(format!("Cannot create directory '{}': {e}", dir.display()))
    })?;
    dir.canonicalize().map_err(|e| {
        CregraphError::IoError(format!("Invalid output directory '{}': {e}", dir.display()))
    })
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CregraphError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| CregraphError::SerializationError(e.to_string()))?;
    println!("{text}");
    Ok(())
}

fn print_documents(settings: &Settings, documents: &[Document]) -> Result<(), CregraphError> {
    if settings.json_mode {
        return print_json(&documents);
    }
    if documents.is_empty() {
        println!("No results");
        return Ok(());
    }
    for doc in documents {
        println!("{}", describe(doc));
        for link in doc.links() {
            println!("  {} -> {}", link.ltype, describe(&link.document));
        }
    }
    Ok(())
}

/// One-line summary of a document.
fn describe(doc: &Document) -> String {
    match doc {
        Document::Cre(cre) if cre.id.is_empty() => format!("CRE {}", cre.name),
        Document::Cre(cre) => format!("CRE {} {}", cre.id, cre.name),
        Document::Standard(s) => {
            let mut line = format!("Standard {} {}", s.name, s.section);
            if !s.subsection.is_empty() {
                line.push_str(&format!(" / {}", s.subsection));
            }
            if !s.version.is_empty() {
                line.push_str(&format!(" ({})", s.version));
            }
            line
        }
    }
}

fn print_outcome(settings: &Settings, outcome: LinkOutcome, what: &str) -> Result<(), CregraphError> {
    if settings.json_mode {
        return print_json(&outcome);
    }
    match outcome {
        LinkOutcome::Created => println!("Linked {what}"),
        LinkOutcome::Retyped { previous } => println!("Retyped {what} (was {previous})"),
        LinkOutcome::Unchanged => println!("Unchanged {what}"),
    }
    Ok(())
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(settings: &Settings, host: &str, port: u16) -> Result<(), CregraphError> {
    let collection = open_collection(settings)?;
    tracing::info!(
        backend = %settings.backend,
        database = %settings.database.display(),
        "collection opened"
    );
    let addr = format!("{host}:{port}");
    api::run_server(&addr, collection).await
}

// =============================================================================
// STATUS / INIT / HASH
// =============================================================================

/// Show collection status.
pub fn cmd_status(settings: &Settings) -> Result<(), CregraphError> {
    let collection = open_collection(settings)?;
    let status = collection.status()?;
    let names = collection.standard_names()?;

    if settings.json_mode {
        let output = serde_json::json!({
            "database": settings.database.to_string_lossy(),
            "backend": settings.backend.to_string(),
            "status": status,
            "standard_names": names,
        });
        return print_json(&output);
    }

    if !settings.quiet {
        println!("cregraph Status");
        println!("===============");
        println!("Database: {}", settings.database.display());
        println!("Backend:  {}", settings.backend);
        println!();
    }
    println!("CREs:            {}", status.cres);
    println!("Standards:       {}", status.standards);
    println!("Internal links:  {}", status.internal_links);
    println!("External links:  {}", status.external_links);
    println!("Mirror nodes:    {}", status.mirror_nodes);
    println!("Mirror edges:    {}", status.mirror_edges);
    println!("Max connections: {}", status.max_internal_connections);
    if !names.is_empty() {
        println!("Standard names:  {}", names.join(", "));
    }
    Ok(())
}

/// Initialize a new database.
pub fn cmd_init(settings: &Settings, force: bool) -> Result<(), CregraphError> {
    if settings.backend == Backend::Memory {
        return Err(CregraphError::InvalidQuery(
            "init needs the redb backend".to_string(),
        ));
    }
    let path = &settings.database;
    if path.exists() {
        if !force {
            return Err(CregraphError::Conflict(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(path).map_err(|e| {
            CregraphError::IoError(format!("Cannot remove '{}': {e}", path.display()))
        })?;
    }
    let _collection = Collection::with_redb(path)?;
    if !settings.quiet {
        println!("Initialized new redb database at {}", path.display());
    }
    Ok(())
}

/// Print the BLAKE3 checksum of the export map.
pub fn cmd_hash(settings: &Settings) -> Result<(), CregraphError> {
    let collection = open_collection(settings)?;
    let checksum = collection.checksum()?;
    if settings.json_mode {
        return print_json(&serde_json::json!({ "checksum": checksum }));
    }
    println!("{checksum}");
    Ok(())
}

// =============================================================================
// UPSERTS
// =============================================================================

pub fn cmd_add_cre(
    settings: &Settings,
    name: &str,
    external_id: Option<&str>,
    description: &str,
    tags: &[String],
) -> Result<(), CregraphError> {
    let mut collection = open_collection(settings)?;
    warn_if_volatile(settings);
    let draft = CreDraft::new(name, external_id)
        .with_description(description)
        .with_tags(tags.iter().cloned());
    let record = collection.add_cre(&draft)?;
    if settings.json_mode {
        return print_json(&record);
    }
    println!("CRE {} stored as {}", record.name, record.id.0);
    Ok(())
}

/// Standard fields collected from the command line.
#[derive(Debug, Clone)]
pub struct StandardArgs {
    pub name: String,
    pub section: String,
    pub subsection: String,
    pub version: String,
    pub hyperlink: String,
    pub tags: Vec<String>,
}

pub fn cmd_add_standard(settings: &Settings, args: StandardArgs) -> Result<(), CregraphError> {
    let mut collection = open_collection(settings)?;
    warn_if_volatile(settings);
    let draft = StandardDraft::new(args.name, args.section)
        .with_subsection(args.subsection)
        .with_version(args.version)
        .with_hyperlink(args.hyperlink)
        .with_tags(args.tags);
    let record = collection.add_standard(&draft)?;
    if settings.json_mode {
        return print_json(&record);
    }
    println!(
        "Standard {} {} stored as {}",
        record.name, record.section, record.id.0
    );
    Ok(())
}

pub fn cmd_link_cres(
    settings: &Settings,
    group: &str,
    member: &str,
    link_type: LinkType,
) -> Result<(), CregraphError> {
    let mut collection = open_collection(settings)?;
    warn_if_volatile(settings);
    let group_row = cre_by_external_id(&collection, group)?;
    let member_row = cre_by_external_id(&collection, member)?;
    let outcome = collection.link_cres(
        &CreRef::from(&group_row),
        &CreRef::from(&member_row),
        link_type,
    )?;
    print_outcome(settings, outcome, &format!("{group} {link_type} {member}"))
}

pub fn cmd_link_standard(
    settings: &Settings,
    cre: &str,
    standard: StandardRef,
    link_type: LinkType,
) -> Result<(), CregraphError> {
    let mut collection = open_collection(settings)?;
    warn_if_volatile(settings);
    let cre_row = cre_by_external_id(&collection, cre)?;
    let what = format!("{cre} {link_type} {standard}");
    let outcome = collection.link_standard(&CreRef::from(&cre_row), &standard, link_type)?;
    print_outcome(settings, outcome, &what)
}

// =============================================================================
// QUERIES
// =============================================================================

/// Show a CRE with its links and direct ancestors.
pub fn cmd_show(settings: &Settings, external_id: &str) -> Result<(), CregraphError> {
    let collection = open_collection(settings)?;
    let record = cre_by_external_id(&collection, external_id)?;
    let links = collection.links_of(record.id)?;
    let ancestors = collection.ancestors_of(record.id)?;

    if settings.json_mode {
        let output = serde_json::json!({
            "cre": record,
            "links": links,
            "ancestors": ancestors,
        });
        return print_json(&output);
    }

    println!("{} {}", record.external_id, record.name);
    if !record.description.is_empty() {
        println!("{}", record.description);
    }
    if !record.tags.is_empty() {
        let tags: Vec<&str> = record.tags.iter().map(String::as_str).collect();
        println!("Tags: {}", tags.join(", "));
    }
    if !ancestors.is_empty() {
        println!();
        println!("Part of:");
        for ancestor in &ancestors {
            println!("  {} {}", ancestor.external_id, ancestor.name);
        }
    }
    if !links.is_empty() {
        println!();
        println!("Links:");
        for link in &links {
            println!("  {} -> {}", link.ltype, describe(&link.document));
        }
    }
    Ok(())
}

pub fn cmd_search(settings: &Settings, text: &str) -> Result<(), CregraphError> {
    let collection = open_collection(settings)?;
    let documents = collection.search(text)?;
    print_documents(settings, &documents)
}

pub fn cmd_gap(settings: &Settings, names: &[String]) -> Result<(), CregraphError> {
    let collection = open_collection(settings)?;
    let documents = collection.gap_analysis(names)?;
    print_documents(settings, &documents)
}

// =============================================================================
// EXPORT / IMPORT
// =============================================================================

/// Write every exported document to `<dir>/<key>.json`.
pub fn cmd_export(settings: &Settings, dir: &Path) -> Result<(), CregraphError> {
    let collection = open_collection(settings)?;
    let documents = collection.export()?;
    let dir = validate_output_dir(dir)?;

    for (key, doc) in &documents {
        let path = dir.join(export_file_name(key));
        let text = serde_json::to_string_pretty(doc)
            .map_err(|e| CregraphError::SerializationError(e.to_string()))?;
        std::fs::write(&path, text).map_err(|e| {
            CregraphError::IoError(format!("Cannot write '{}': {e}", path.display()))
        })?;
    }

    if settings.json_mode {
        return print_json(&serde_json::json!({
            "directory": dir.to_string_lossy(),
            "documents": documents.len(),
        }));
    }
    println!("Exported {} documents to {}", documents.len(), dir.display());
    Ok(())
}

/// An import file holds either a list of documents or an export map.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ImportFile {
    List(Vec<Document>),
    Map(BTreeMap<String, Document>),
    Single(Document),
}

impl ImportFile {
    fn into_documents(self) -> Vec<Document> {
        match self {
            Self::List(docs) => docs,
            Self::Map(map) => map.into_values().collect(),
            Self::Single(doc) => vec![doc],
        }
    }
}

/// Parse an import file body.
fn parse_import(data: &[u8]) -> Result<Vec<Document>, CregraphError> {
    serde_json::from_slice::<ImportFile>(data)
        .map(ImportFile::into_documents)
        .map_err(|e| CregraphError::DeserializationError(format!("Invalid import file: {e}")))
}

pub fn cmd_import(settings: &Settings, file: &Path) -> Result<(), CregraphError> {
    let path = validate_file_path(file)?;
    validate_file_size(&path, MAX_IMPORT_FILE_SIZE)?;
    let data = std::fs::read(&path)
        .map_err(|e| CregraphError::IoError(format!("Cannot read '{}': {e}", path.display())))?;
    let documents = parse_import(&data)?;

    let mut collection = open_collection(settings)?;
    warn_if_volatile(settings);
    let report = collection.import(&documents)?;

    if settings.json_mode {
        return print_json(&report);
    }
    println!(
        "Imported {} CREs, {} standards, {} links ({} rejected)",
        report.cres, report.standards, report.links, report.rejected
    );
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the collection the settings point at.
pub fn open_collection(settings: &Settings) -> Result<Collection, CregraphError> {
    match settings.backend {
        Backend::Redb => Collection::with_redb(&settings.database),
        Backend::Memory => Collection::in_memory(),
    }
}

fn warn_if_volatile(settings: &Settings) {
    if settings.backend == Backend::Memory {
        tracing::warn!("memory backend: changes are discarded when the command exits");
    }
}

fn cre_by_external_id(
    collection: &Collection,
    external_id: &str,
) -> Result<CreRecord, CregraphError> {
    collection
        .store()
        .find_cres(&CreFilter::by_external_id(external_id))?
        .into_iter()
        .next()
        .ok_or_else(|| {
            tracing::error!(external_id, "no CRE with this external id");
            CregraphError::NotFound(format!("CRE {external_id}"))
        })
}

// =============================================================================
// TESTS
// =============================================================================
