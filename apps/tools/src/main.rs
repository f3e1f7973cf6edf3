use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crud::Query;
use serde_json::Value;
use shared::domain::{FieldMap, PageRequest, RecordKey};
use storage::Storage;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://./data/crud.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resource names with their record counts.
    Resources,
    List {
        resource: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        per_page: u32,
        /// Equality filter, `field=value`; repeatable.
        #[arg(long = "where", value_parser = parse_field)]
        filters: Vec<(String, Value)>,
    },
    Show {
        resource: String,
        key: String,
    },
    /// Inserts or replaces a record. Without `--key` the next numeric key is used.
    Put {
        resource: String,
        #[arg(long)]
        key: Option<String>,
        /// `field=value`; values that parse as JSON are stored typed.
        #[arg(long = "field", value_parser = parse_field, required = true)]
        fields: Vec<(String, Value)>,
    },
    Delete {
        resource: String,
        key: String,
    },
}

fn parse_field(raw: &str) -> Result<(String, Value), String> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing field name in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((name.to_string(), value))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open '{}'", cli.database_url))?;

    match cli.command {
        Command::Resources => {
            for (resource, count) in storage.list_resources().await? {
                println!("{resource}\t{count}");
            }
        }
        Command::List {
            resource,
            page,
            per_page,
            filters,
        } => {
            let query = filters
                .into_iter()
                .fold(Query::all(), |query, (field, value)| query.where_eq(field, value));
            let request = PageRequest::new(page, per_page)?;
            let total = storage.count_rows(&resource, &query).await?;
            let request = request.normalized(total);
            let rows = storage
                .select_rows(&resource, &query, Some(request.size()), request.offset())
                .await?;
            for row in rows {
                println!("{}\t{}", row.key, serde_json::to_string(&row.fields)?);
            }
            println!("page {} of {total} records", request.page());
        }
        Command::Show { resource, key } => {
            let key = RecordKey::parse(&key).context("key must not be blank")?;
            let Some(row) = storage.load_row(&resource, &key).await? else {
                bail!("{resource} '{key}' not found");
            };
            println!("{}", serde_json::to_string_pretty(&row.fields)?);
            println!("created {}  updated {}", row.created_at, row.updated_at);
        }
        Command::Put {
            resource,
            key,
            fields,
        } => {
            let fields: FieldMap = fields.into_iter().collect();
            let key = match key.as_deref().and_then(RecordKey::parse) {
                Some(key) => {
                    storage.upsert_row(&resource, &key, &fields).await?;
                    key
                }
                None => storage.insert_next(&resource, "id", &fields).await?,
            };
            info!(%resource, %key, "record stored");
            println!("stored {resource} '{key}'");
        }
        Command::Delete { resource, key } => {
            let key = RecordKey::parse(&key).context("key must not be blank")?;
            let removed = storage.delete_row(&resource, &key).await?;
            println!("removed {removed} record(s)");
        }
    }

    Ok(())
}
