//! Administrative CLI for Satchel tables.

mod entry;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use entry::Entry;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use satchel_core::config::AppConfig;
use satchel_core::{ItemId, TenantId};
use satchel_store::Expression;
use satchel_table::Context as AppContext;
use satchel_table::{ContentCodec, Cursor, Pager, QueryOptions, Table, TableSpec};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "satchelctl")]
#[command(about = "Administrative CLI for Satchel tables")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct GlobalArgs {
    /// Config file path (optional, SATCHEL_* env vars override it)
    #[arg(long, global = true, env = "SATCHEL_CONFIG", default_value = "satchel.toml")]
    config: String,

    /// Tenant id to act as (overrides identity.tenant_id)
    #[arg(long, global = true, env = "SATCHEL_TENANT")]
    tenant: Option<String>,
}

#[derive(Args, Clone)]
struct TableArgs {
    /// Logical table name
    #[arg(long, short = 't')]
    table: String,
}

#[derive(Args, Clone)]
struct PagingArgs {
    /// Rows per page (default: paging.default_page_size)
    #[arg(long)]
    page_size: Option<usize>,

    /// Resume from a cursor printed by an earlier listing
    #[arg(long)]
    cursor: Option<String>,

    /// Keep fetching until the listing is exhausted
    #[arg(long, default_value_t = false)]
    all: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an entry, overwriting any entry with the same id
    Put {
        #[command(flatten)]
        table: TableArgs,
        /// Entry id (random if omitted)
        #[arg(long)]
        id: Option<String>,
        /// Content as a JSON object
        content: String,
    },
    /// Print one entry
    Get {
        #[command(flatten)]
        table: TableArgs,
        id: String,
    },
    /// List the current tenant's entries in id order
    List {
        #[command(flatten)]
        table: TableArgs,
        #[command(flatten)]
        paging: PagingArgs,
        /// Newest id first
        #[arg(long, default_value_t = false)]
        descending: bool,
    },
    /// Scan every entry of a table with store-side filters
    Scan {
        #[command(flatten)]
        table: TableArgs,
        /// Keep rows whose attribute at PATH contains VALUE (dotted path, e.g. content.title=leaf)
        #[arg(long = "contains", value_name = "PATH=VALUE")]
        contains: Vec<String>,
        #[command(flatten)]
        paging: PagingArgs,
    },
    /// Delete an entry
    Remove {
        #[command(flatten)]
        table: TableArgs,
        id: String,
    },
    /// Rotate the tenant id and migrate the given tables to it
    Rotate {
        /// New tenant id
        #[arg(long)]
        to: String,
        /// External provider linked by this rotation
        #[arg(long)]
        link: Option<String>,
        /// Tables to migrate
        #[arg(long = "table", short = 't', required = true)]
        tables: Vec<String>,
    },
    /// Show the configured identity and store
    Whoami,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine-readable.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let Cli { global, command } = Cli::parse();
    let config = load_config(&global)?;
    let default_page_size = config.paging.default_page_size;

    let ctx = AppContext::from_config(config)
        .await
        .context("failed to initialize context")?;
    ctx.store()
        .health_check()
        .await
        .context("store health check failed")?;

    match command {
        Commands::Put { table, id, content } => {
            let content = match serde_json::from_str::<Value>(&content)
                .context("content must be valid JSON")?
            {
                Value::Object(map) => map,
                other => bail!("content must be a JSON object, got {other}"),
            };
            let id = match id {
                Some(id) => ItemId::parse(&id)?,
                None => ItemId::random(),
            };
            let entries = open_entries(&ctx, &table.table).await?;
            entries
                .put(&Entry::new(id.clone(), content))
                .await
                .context("failed to write entry")?;
            println!("{id}");
        }
        Commands::Get { table, id } => {
            let entries = open_entries(&ctx, &table.table).await?;
            let id = ItemId::parse(&id)?;
            match entries.get(&id).await.context("failed to read entry")? {
                Some(entry) => println!("{}", serde_json::to_string_pretty(&entry.to_json())?),
                None => bail!("entry {id} not found in {}", entries.name()),
            }
        }
        Commands::List {
            table,
            paging,
            descending,
        } => {
            let entries = open_entries(&ctx, &table.table).await?;
            let options = if descending {
                QueryOptions::new().descending()
            } else {
                QueryOptions::new()
            };
            print_pages(entries.query_pager(options), &paging, default_page_size).await?;
        }
        Commands::Scan {
            table,
            contains,
            paging,
        } => {
            let filter = parse_filter(&contains)?;
            let entries = open_entries(&ctx, &table.table).await?;
            print_pages(entries.scan_pager(filter), &paging, default_page_size).await?;
        }
        Commands::Remove { table, id } => {
            let entries = open_entries(&ctx, &table.table).await?;
            entries
                .remove(&ItemId::parse(&id)?)
                .await
                .context("failed to remove entry")?;
        }
        Commands::Rotate { to, link, tables } => {
            let new_id = TenantId::parse(&to)?;
            for name in &tables {
                open_entries(&ctx, name).await?;
            }
            let identity = ctx.identity();
            let stats = match link {
                Some(provider) => identity.link_provider(provider, new_id).await,
                None => identity.rotate(new_id).await,
            };
            println!("{}", serde_json::to_string_pretty(&stats)?);

            let failed: usize = stats.iter().map(|s| s.failed).sum();
            if failed > 0 {
                bail!("{failed} rows could not be migrated and remain under the old tenant id");
            }
            eprintln!("Rotated to {to}; pass --tenant {to} to subsequent commands");
        }
        Commands::Whoami => {
            let summary = serde_json::json!({
                "app_name": ctx.config().app_name,
                "backend": ctx.store().backend_name(),
                "identity": *ctx.identity().current(),
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}

/// Merge the optional config file with `SATCHEL_` env vars. A tenant id is
/// required since every table operation is tenant-scoped.
fn load_config(args: &GlobalArgs) -> Result<AppConfig> {
    let mut figment = Figment::new();
    if Path::new(&args.config).exists() {
        tracing::debug!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::debug!("No config file found at {}", args.config);
    }

    let mut config: AppConfig = figment
        .merge(Env::prefixed("SATCHEL_").split("__"))
        .extract()
        .context("failed to load configuration")?;

    if let Some(tenant) = &args.tenant {
        config.identity.tenant_id = Some(tenant.clone());
    }
    if config.identity.tenant_id.is_none() {
        bail!(
            "No tenant id configured.\n\n\
             Provide one via --tenant, SATCHEL_TENANT, or identity.tenant_id in {}",
            args.config
        );
    }
    Ok(config)
}

async fn open_entries(ctx: &AppContext, name: &str) -> Result<Arc<Table<Entry>>> {
    ctx.table_for::<Entry>(TableSpec::new(name), Arc::new(ContentCodec::new()))
        .await
        .with_context(|| format!("failed to open table {name}"))
}

/// Build a filter from `PATH=VALUE` arguments. Values that parse as JSON are
/// matched as JSON, anything else as a string.
fn parse_filter(contains: &[String]) -> Result<Expression> {
    contains.iter().try_fold(Expression::new(), |filter, arg| {
        let Some((path, value)) = arg.split_once('=') else {
            bail!("invalid --contains '{arg}', expected PATH=VALUE");
        };
        let segments: Vec<&str> = path.split('.').collect();
        if segments.iter().any(|s| s.is_empty()) {
            bail!("invalid attribute path '{path}'");
        }
        let value =
            serde_json::from_str::<Value>(value).unwrap_or_else(|_| Value::String(value.into()));
        Ok(filter.and_contains(&segments, value))
    })
}

/// Print one page (or every page with `--all`) as JSON lines. If rows
/// remain, the resume cursor goes to stderr.
async fn print_pages(pager: Pager<Entry>, paging: &PagingArgs, default_page_size: usize) -> Result<()> {
    let page_size = paging.page_size.unwrap_or(default_page_size);
    if page_size == 0 {
        bail!("--page-size must be at least 1");
    }
    let pager = match &paging.cursor {
        Some(token) => pager.resume(Cursor::from_token(token).context("invalid --cursor")?),
        None => pager,
    };

    loop {
        let page = pager.more(page_size).await.context("failed to fetch page")?;
        for entry in &page {
            println!("{}", entry.to_json());
        }
        if !paging.all || !pager.has_more() {
            break;
        }
    }

    if pager.has_more() {
        eprintln!("cursor: {}", pager.cursor().to_token());
    }
    Ok(())
}
