//! Handle registry command line interface
//!
//! Operates directly on a local sled database holding handle records and a
//! small item catalog.

mod catalog;

use anyhow::{Context, Result};
use catalog::{CatalogItem, ItemCatalog};
use clap::{Parser, Subcommand, ValueEnum};
use hdl_handle_registry::{Handle, HandleRegistry, RegistryConfig, ResolverTable, ResourceType};
use hdl_storage::SledRecordStore;
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "hdl")]
#[command(about = "Persistent identifier (handle) registry", long_about = None)]
#[command(version)]
struct Cli {
    /// Handle database directory
    #[arg(long, default_value = "./data/handles.db")]
    db: PathBuf,

    /// TOML configuration file (HDL_* environment variables also apply)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Site handle prefix, overriding configuration
    #[arg(long)]
    prefix: Option<String>,

    /// Item dissemination base URL, overriding configuration
    #[arg(long)]
    item_url_prefix: Option<String>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Print results as JSON
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new item and mint its handle
    Register {
        /// Item title
        title: String,
    },
    /// Resolve a handle to its item
    Resolve {
        /// Handle, bare or hdl:-qualified
        handle: String,
    },
    /// Resolve a handle to its dissemination URL
    Url {
        /// Handle, bare or hdl:-qualified
        handle: String,
    },
    /// Find the handle assigned to an item
    Find {
        /// Item id
        item_id: i64,
    },
    /// List handles starting with a literal prefix
    List {
        /// Prefix, matched literally
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Print the canonical hdl: form of a handle
    Canonical { handle: String },
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    let mut config = RegistryConfig::load(cli.config.as_deref())?;
    if let Some(prefix) = &cli.prefix {
        config = config.with_prefix(prefix.clone());
    }
    if let Some(url) = &cli.item_url_prefix {
        config = config.with_item_url_prefix(url.clone());
    }

    if let Some(parent) = cli.db.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = Arc::new(
        SledRecordStore::new(&cli.db)
            .with_context(|| format!("opening handle database {}", cli.db.display()))?,
    );
    let catalog = ItemCatalog::open(store.clone())?;
    let registry = HandleRegistry::new(
        store.clone(),
        ResolverTable::with_items(catalog.clone()),
        config,
    );

    let found = run(&cli, &registry, &catalog)?;
    store.flush()?;

    Ok(if found {
        ExitCode::SUCCESS
    } else {
        if !cli.json {
            println!("not found");
        }
        ExitCode::from(1)
    })
}

/// Execute one subcommand; `false` means the lookup found nothing.
fn run(
    cli: &Cli,
    registry: &HandleRegistry<CatalogItem>,
    catalog: &ItemCatalog,
) -> Result<bool> {
    match &cli.command {
        Commands::Register { title } => {
            // fail before the catalog consumes an item id
            registry.ensure_mintable(ResourceType::Item)?;
            let item = catalog.create(title)?;
            let handle = registry.create_handle(&item)?;
            debug!(%handle, item_id = item.id, "Registered item");
            emit(cli.json, json!({ "handle": handle, "item": item }), handle.as_str());
            Ok(true)
        }
        Commands::Resolve { handle } => {
            let handle = Handle::from_canonical(handle);
            match registry.resolve_to_object(handle.as_str())? {
                Some(item) => {
                    let text = format!("{}\t{}", item.id, item.title);
                    emit(cli.json, json!({ "handle": handle, "item": item }), &text);
                    Ok(true)
                }
                None => not_found(cli.json, json!({ "handle": handle, "item": null })),
            }
        }
        Commands::Url { handle } => {
            let handle = Handle::from_canonical(handle);
            match registry.resolve_to_url(handle.as_str())? {
                Some(url) => {
                    emit(cli.json, json!({ "handle": handle, "url": url }), &url);
                    Ok(true)
                }
                None => not_found(cli.json, json!({ "handle": handle, "url": null })),
            }
        }
        Commands::Find { item_id } => {
            let handle = match catalog.get(*item_id)? {
                Some(item) => registry.find_handle(&item)?,
                None => None,
            };
            match handle {
                Some(handle) => {
                    emit(
                        cli.json,
                        json!({ "item_id": item_id, "handle": handle }),
                        handle.as_str(),
                    );
                    Ok(true)
                }
                None => not_found(cli.json, json!({ "item_id": item_id, "handle": null })),
            }
        }
        Commands::List { prefix } => {
            let handles = registry.handles_for_prefix(prefix)?;
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&handles)?);
            } else {
                for handle in &handles {
                    println!("{handle}");
                }
            }
            Ok(true)
        }
        Commands::Canonical { handle } => {
            let canonical = HandleRegistry::<CatalogItem>::canonical_form(handle);
            emit(cli.json, json!({ "canonical": canonical }), &canonical);
            Ok(true)
        }
    }
}

fn emit(as_json: bool, value: serde_json::Value, text: &str) {
    if as_json {
        println!("{value:#}");
    } else {
        println!("{text}");
    }
}

fn not_found(as_json: bool, value: serde_json::Value) -> Result<bool> {
    if as_json {
        println!("{value:#}");
    }
    Ok(false)
}

fn init_logging(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
    }
}
