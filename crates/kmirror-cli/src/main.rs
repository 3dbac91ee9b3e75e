//! kmirror CLI: vault/store knowledge sync and search indexing.
//!
//! Commands: vault, sync, knowledge, index, id, completions.
//! Results go to stdout as JSON; logs go to stderr.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kmirror_core::id::{generate_id, parse_id, random_hex};
use kmirror_core::{CancelToken, KmError, KnowledgeStatus};
use kmirror_search::{
    IndexKind, Indexer, MeiliClient, SearchBackend, SearchCoordinator, SearchRequest,
};
use kmirror_store::{KnowledgeFilter, KnowledgeStore, SqliteStore};
use kmirror_vault::{
    register_vault, update_vault, ConflictPolicy, SyncConfig, SyncDirection, SyncEngine,
};

use config::Config;

#[derive(Parser)]
#[command(name = "kmirror")]
#[command(version)]
#[command(about = "Mirror knowledge between markdown vaults, the store, and search")]
struct Cli {
    /// Config file (default: ./kmirror.yaml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// SQLite database path (overrides config and KMIRROR_DB)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage vault mappings
    #[command(subcommand)]
    Vault(VaultCommand),
    /// Run one sync pass for a vault
    Sync {
        vault_id: String,
        #[arg(long, default_value = "bidirectional")]
        direction: SyncDirection,
        #[arg(long, default_value = "newer_wins")]
        policy: ConflictPolicy,
        /// Base-name glob a file must match (repeatable)
        #[arg(long)]
        include: Vec<String>,
        /// Base-name glob that excludes a file (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
    },
    /// Inspect knowledge rows
    #[command(subcommand)]
    Knowledge(KnowledgeCommand),
    /// Search index maintenance and queries
    #[command(subcommand)]
    Index(IndexCommand),
    /// Identifier utilities
    #[command(subcommand)]
    Id(IdCommand),
    /// Print shell completions
    Completions { shell: clap_complete::Shell },
}

#[derive(Subcommand)]
enum VaultCommand {
    /// Bind a vault directory to a category
    Add {
        path: PathBuf,
        #[arg(long)]
        category: String,
        /// Display label (default: directory name)
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        auto_sync: bool,
    },
    /// Rebind a vault to a directory, category, and sync flag
    Update {
        vault_id: String,
        path: PathBuf,
        #[arg(long)]
        category: String,
        /// New display label (default: keep the current one)
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        auto_sync: bool,
    },
    List,
    Remove { vault_id: String },
}

#[derive(Subcommand)]
enum KnowledgeCommand {
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        source: Option<String>,
        /// draft, published, or archived
        #[arg(long)]
        status: Option<String>,
    },
    /// Import a markdown file as the entry at PATH in a vault
    Import {
        vault_id: String,
        /// Vault-relative path the entry is keyed by
        path: String,
        /// Markdown file to read (default: stdin)
        #[arg(long)]
        file: Option<PathBuf>,
        #[arg(long, default_value = "")]
        author: String,
    },
    /// Write one entry into a vault
    Export {
        knowledge_id: String,
        #[arg(long)]
        vault: String,
    },
}

#[derive(Subcommand)]
enum IndexCommand {
    /// Create missing indexes and apply their settings
    Init,
    /// Re-push every entity of every kind
    Rebuild,
    Search {
        /// projects, knowledge, products, or forum_posts
        index: IndexKind,
        query: String,
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long)]
        offset: Option<usize>,
        #[arg(long)]
        filter: Option<String>,
        /// attribute:asc or attribute:desc (repeatable)
        #[arg(long)]
        sort: Vec<String>,
    },
    Health,
}

#[derive(Subcommand)]
enum IdCommand {
    /// Generate sortable ids
    New {
        #[arg(long, default_value_t = 1)]
        count: usize,
    },
    /// Random lowercase hex token of 2N characters
    Hex { bytes: usize },
    /// Print the timestamp embedded in an id
    Parse { id: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kmirror=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let open_store = || -> Result<(Config, Arc<SqliteStore>)> {
        let config = Config::load(cli.config.as_deref()).context("loading config")?;
        let db = config.database_path(cli.db.as_deref());
        let store =
            SqliteStore::open(&db).with_context(|| format!("opening {}", db.display()))?;
        Ok((config, Arc::new(store)))
    };

    match cli.command {
        Commands::Vault(command) => {
            let (_, store) = open_store()?;
            run_vault(&store, command)
        }
        Commands::Sync {
            vault_id,
            direction,
            policy,
            include,
            exclude,
        } => {
            let (_, store) = open_store()?;
            let sync = SyncConfig {
                include,
                exclude,
                ..SyncConfig::new(vault_id, direction).with_policy(policy)
            };
            run_sync(store, sync).await
        }
        Commands::Knowledge(command) => {
            let (_, store) = open_store()?;
            run_knowledge(store, command)
        }
        Commands::Index(command) => {
            let (config, store) = open_store()?;
            run_index(&config, store, command).await
        }
        Commands::Id(command) => run_id(command),
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "kmirror", &mut std::io::stdout());
            Ok(())
        }
    }
}

fn run_vault(store: &SqliteStore, command: VaultCommand) -> Result<()> {
    match command {
        VaultCommand::Add {
            path,
            category,
            label,
            auto_sync,
        } => {
            let mapping = register_vault(store, &path, &category, label.as_deref(), auto_sync)?;
            info!(vault_id = %mapping.id, path = %mapping.local_path, "registered vault");
            print_json(&mapping)
        }
        VaultCommand::Update {
            vault_id,
            path,
            category,
            label,
            auto_sync,
        } => {
            let mapping =
                update_vault(store, &vault_id, &path, &category, label.as_deref(), auto_sync)?;
            print_json(&mapping)
        }
        VaultCommand::List => print_json(&store.list_vault_mappings()?),
        VaultCommand::Remove { vault_id } => {
            if !store.delete_vault_mapping(&vault_id)? {
                return Err(KmError::VaultNotFound(vault_id).into());
            }
            print_json(&json!({ "removed": vault_id }))
        }
    }
}

fn run_knowledge(store: Arc<SqliteStore>, command: KnowledgeCommand) -> Result<()> {
    match command {
        KnowledgeCommand::List {
            category,
            source,
            status,
        } => {
            let filter = KnowledgeFilter {
                category_id: category,
                source,
                status: status.map(|s| parse_status(&s)).transpose()?,
            };
            print_json(&store.list_knowledge(&filter)?)
        }
        KnowledgeCommand::Import {
            vault_id,
            path,
            file,
            author,
        } => {
            let content = match file {
                Some(file) => std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?,
                None => std::io::read_to_string(std::io::stdin()).context("reading stdin")?,
            };
            let entry = SyncEngine::new(store).import_markdown(&vault_id, &path, &content, &author)?;
            print_json(&entry)
        }
        KnowledgeCommand::Export {
            knowledge_id,
            vault,
        } => {
            let path = SyncEngine::new(store).export_entry(&knowledge_id, &vault)?;
            print_json(&json!({ "id": knowledge_id, "path": path }))
        }
    }
}

async fn run_sync(store: Arc<SqliteStore>, sync: SyncConfig) -> Result<()> {
    let engine = SyncEngine::new(store);
    let cancel = CancelToken::new();

    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current file");
            on_signal.cancel();
        }
    });

    let stats = tokio::task::spawn_blocking(move || engine.run_with_cancel(&sync, &cancel))
        .await
        .context("sync task panicked")??;
    print_json(&stats)
}

async fn run_index(
    config: &Config,
    store: Arc<SqliteStore>,
    command: IndexCommand,
) -> Result<()> {
    let credentials = config.search_credentials()?;
    let backend: Arc<dyn SearchBackend> =
        Arc::new(MeiliClient::new(&credentials.host, Some(credentials.api_key.as_str()))?);
    let coordinator = SearchCoordinator::new(backend).with_config(config.coordinator_config());

    match command {
        IndexCommand::Init => {
            let created = coordinator.initialize_indexes().await?;
            print_json(&json!({ "created": created }))
        }
        IndexCommand::Rebuild => {
            coordinator.initialize_indexes().await?;
            let stats = Indexer::new(store, coordinator).rebuild_all().await?;
            print_json(&stats)
        }
        IndexCommand::Search {
            index,
            query,
            limit,
            offset,
            filter,
            sort,
        } => {
            let request = SearchRequest {
                limit,
                offset,
                filter,
                sort,
                ..SearchRequest::query(query)
            };
            print_json(&coordinator.search(index, &request).await?)
        }
        IndexCommand::Health => {
            let available = coordinator.health().await?;
            print_json(&json!({ "available": available }))
        }
    }
}

fn run_id(command: IdCommand) -> Result<()> {
    match command {
        IdCommand::New { count } => {
            let ids = (0..count)
                .map(|_| generate_id())
                .collect::<std::result::Result<Vec<_>, _>>()?;
            print_json(&ids)
        }
        IdCommand::Hex { bytes } => print_json(&random_hex(bytes)?),
        IdCommand::Parse { id } => {
            let at = parse_id(&id)?;
            print_json(&json!({ "id": id, "timestamp": at.to_rfc3339() }))
        }
    }
}

fn parse_status(value: &str) -> Result<KnowledgeStatus> {
    let status = KnowledgeStatus::parse(value);
    if status.as_str() != value {
        bail!("unknown status '{value}' (expected draft, published, or archived)");
    }
    Ok(status)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
