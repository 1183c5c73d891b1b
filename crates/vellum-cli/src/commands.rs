use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use serde::Serialize;
use tracing::debug;
use vellum::{Database, DatabaseConfig, ObjectMetadata};
use vellum_codec::{inspect, peek_header};
use vellum_view::{VIEW_IMPL, VIEW_IMPL_VERSION};

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Inspect(args) => cmd_inspect(&args.path, config, format),
        Command::Views(args) => cmd_views(&args.path, config, format),
        Command::Get(args) => cmd_get(args, config, format),
        Command::Prune(args) => cmd_prune(args, config, format),
        Command::Checkpoint(args) => cmd_checkpoint(&args.path, config),
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<DatabaseConfig> {
    match path {
        Some(path) => DatabaseConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display())),
        None => Ok(DatabaseConfig::default()),
    }
}

fn open_store(path: &Path, config: DatabaseConfig) -> anyhow::Result<Database> {
    if !path.is_dir() {
        bail!("no store at {}", path.display());
    }
    let db = Database::open(path, config)
        .with_context(|| format!("failed to open store at {}", path.display()))?;
    debug!(path = %path.display(), commit = db.commit(), "store opened");
    Ok(db)
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ---- Summaries ----

#[derive(Debug, Serialize)]
pub struct StoreSummary {
    pub path: PathBuf,
    pub commit: u64,
    pub collections: Vec<CollectionSummary>,
    pub views: Vec<ViewSummary>,
}

#[derive(Debug, Serialize)]
pub struct CollectionSummary {
    pub name: String,
    pub records: usize,
    /// Record count per `type@version`.
    pub types: BTreeMap<String, usize>,
    /// Records that are not object envelopes.
    pub unreadable: usize,
}

#[derive(Debug, Serialize)]
pub struct ViewSummary {
    pub name: String,
    /// Built by the current materialization scheme.
    pub current_scheme: bool,
}

pub fn summarize(db: &Database) -> StoreSummary {
    let collections = db.read(|tx| {
        tx.collections()
            .map(|name| {
                let mut types = BTreeMap::new();
                let mut unreadable = 0;
                for (_, record) in tx.iter(name) {
                    match peek_header(&record.object) {
                        Some(header) => {
                            *types
                                .entry(format!("{}@{}", header.type_id, header.version))
                                .or_insert(0) += 1
                        }
                        None => unreadable += 1,
                    }
                }
                CollectionSummary {
                    name: name.to_string(),
                    records: tx.len(name),
                    types,
                    unreadable,
                }
            })
            .collect()
    });

    StoreSummary {
        path: db.path().map(Path::to_path_buf).unwrap_or_default(),
        commit: db.commit(),
        collections,
        views: view_summaries(db),
    }
}

pub fn view_summaries(db: &Database) -> Vec<ViewSummary> {
    let prefix = format!("{VIEW_IMPL}_{VIEW_IMPL_VERSION}_");
    db.persisted_views()
        .into_iter()
        .map(|name| ViewSummary {
            current_scheme: name.starts_with(&prefix),
            name,
        })
        .collect()
}

// ---- Commands ----

fn cmd_inspect(path: &Path, config: DatabaseConfig, format: OutputFormat) -> anyhow::Result<()> {
    let db = open_store(path, config)?;
    let summary = summarize(&db);
    db.close()?;

    if format == OutputFormat::Json {
        return print_json(&summary);
    }
    println!("Store {} at commit {}", summary.path.display().to_string().bold(), summary.commit.to_string().yellow());
    if summary.collections.is_empty() {
        println!("\nNo collections.");
    }
    for collection in &summary.collections {
        println!("\n{} ({} records)", collection.name.bold(), collection.records);
        for (ty, count) in &collection.types {
            println!("  {:<24} {}", ty.cyan(), count);
        }
        if collection.unreadable > 0 {
            println!("  {:<24} {}", "unreadable".red(), collection.unreadable);
        }
    }
    print_views(&summary.views);
    Ok(())
}

fn print_views(views: &[ViewSummary]) {
    println!("\nViews: {}", views.len());
    for view in views {
        let marker = if view.current_scheme { "●".green() } else { "○".dimmed() };
        println!("  {} {}", marker, view.name);
    }
}

fn cmd_views(path: &Path, config: DatabaseConfig, format: OutputFormat) -> anyhow::Result<()> {
    let db = open_store(path, config)?;
    let views = view_summaries(&db);
    db.close()?;
    if format == OutputFormat::Json {
        return print_json(&views);
    }
    print_views(&views);
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ObjectReport {
    pub collection: String,
    pub key: String,
    pub type_id: Option<String>,
    pub version: Option<u32>,
    pub fingerprint: Option<String>,
    pub written_at: Option<String>,
    pub fields: Option<serde_json::Value>,
}

pub fn object_report(db: &Database, collection: &str, key: &str) -> anyhow::Result<Option<ObjectReport>> {
    let Some(record) = db.read(|tx| tx.record(collection, key).cloned()) else {
        return Ok(None);
    };
    let metadata = record
        .metadata
        .as_deref()
        .map(ObjectMetadata::decode)
        .transpose()?;
    let raw = inspect(&record.object);
    Ok(Some(ObjectReport {
        collection: collection.to_string(),
        key: key.to_string(),
        type_id: raw.as_ref().map(|r| r.header.type_id.clone()),
        version: raw.as_ref().map(|r| r.header.version),
        fingerprint: metadata.as_ref().map(|m| m.fingerprint.to_hex()),
        written_at: metadata.as_ref().map(|m| m.written_at.to_rfc3339()),
        fields: raw.map(|r| r.fields),
    }))
}

fn cmd_get(args: GetArgs, config: DatabaseConfig, format: OutputFormat) -> anyhow::Result<()> {
    let db = open_store(&args.path, config)?;
    let report = object_report(&db, &args.collection, &args.key)?;
    db.close()?;

    let Some(report) = report else {
        bail!("no object '{}' in collection '{}'", args.key, args.collection);
    };
    if format == OutputFormat::Json {
        return print_json(&report);
    }
    println!("{}/{}", report.collection.bold(), report.key.yellow().bold());
    match (&report.type_id, report.version) {
        (Some(ty), Some(version)) => println!("  Type: {}@{}", ty.cyan(), version),
        _ => println!("  Type: {}", "not an object envelope".red()),
    }
    if let Some(fingerprint) = &report.fingerprint {
        println!("  Fingerprint: {}", fingerprint.dimmed());
    }
    if let Some(written_at) = &report.written_at {
        println!("  Written: {written_at}");
    }
    if let Some(fields) = &report.fields {
        println!("{}", serde_json::to_string_pretty(fields)?);
    }
    Ok(())
}

fn cmd_prune(args: PruneArgs, config: DatabaseConfig, format: OutputFormat) -> anyhow::Result<()> {
    let db = open_store(&args.path, config)?;
    // Nothing is registered in this process, so every persisted view is orphaned.
    let dropped = if args.dry_run {
        db.persisted_views()
    } else {
        db.prune_orphaned_views()
    };
    db.close()?;

    if format == OutputFormat::Json {
        return print_json(&dropped);
    }
    let verb = if args.dry_run { "Would drop" } else { "Dropped" };
    println!("{} {} {} view(s).", "✓".green().bold(), verb, dropped.len());
    for name in &dropped {
        println!("  {}", name.dimmed());
    }
    Ok(())
}

fn cmd_checkpoint(path: &Path, config: DatabaseConfig) -> anyhow::Result<()> {
    let db = open_store(path, config)?;
    db.checkpoint()?;
    let commit = db.commit();
    db.close()?;
    println!("{} Checkpoint written at commit {}", "✓".green().bold(), commit.to_string().yellow());
    Ok(())
}
