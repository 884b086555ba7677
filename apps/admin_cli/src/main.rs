use std::{collections::BTreeMap, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use shared::{
    domain::{Call, CleaningTask, Department, Employee, EntityId, RecurringCall, Resource},
    query::SortDirection,
};
use table_core::{
    LoadOutcome, MutationOutcome, NoticeLevel, RestEntityService, TableEvent, TableOptions,
    TableOrchestrator, TableSnapshot, WsPushConnection,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Browse and edit hotel collections through the table engine")]
struct Cli {
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    server_url: String,
    #[arg(long, value_enum)]
    collection: Collection,
    #[command(subcommand)]
    command: Command,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum Collection {
    Departments,
    Employees,
    Calls,
    RecurringCalls,
    Cleaning,
}

#[derive(Args, Debug, Clone)]
struct PageArgs {
    #[arg(long, default_value_t = 0)]
    page: usize,
    #[arg(long, default_value_t = 10)]
    page_size: usize,
    #[arg(long)]
    sort: Option<String>,
    #[arg(long)]
    desc: bool,
    #[arg(long)]
    search: Option<String>,
    /// `field=value`; repeat for several filters.
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print one page.
    List(PageArgs),
    /// Create a row from a JSON object of field values.
    Create { json: String },
    /// Patch a row; the JSON object must carry its `id`.
    Update { json: String },
    Delete { id: String },
    /// Keep the page mounted and print rows as other clients change them.
    Watch(PageArgs),
}

fn parse_filter(raw: &str) -> Result<(String, String), String> {
    let (field, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected field=value, got '{raw}'"))?;
    if field.is_empty() {
        return Err(format!("missing field name in '{raw}'"));
    }
    Ok((field.to_string(), value.to_string()))
}

fn parse_id(raw: &str) -> EntityId {
    raw.parse::<i64>()
        .map(EntityId::Num)
        .unwrap_or_else(|_| EntityId::Text(raw.to_string()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.collection {
        Collection::Departments => run::<Department>(&cli.server_url, cli.command).await,
        Collection::Employees => run::<Employee>(&cli.server_url, cli.command).await,
        Collection::Calls => run::<Call>(&cli.server_url, cli.command).await,
        Collection::RecurringCalls => run::<RecurringCall>(&cli.server_url, cli.command).await,
        Collection::Cleaning => run::<CleaningTask>(&cli.server_url, cli.command).await,
    }
}

async fn run<T>(server_url: &str, command: Command) -> Result<()>
where
    T: Resource,
    T::Patch: Serialize + DeserializeOwned,
{
    let service = Arc::new(RestEntityService::<T>::new(server_url));
    match command {
        Command::List(args) => {
            let table = TableOrchestrator::new(page_options::<T>(&args), service);
            let outcome = table.change_query(|query| apply_page_args(query, &args)).await;
            expect_loaded(outcome)?;
            print_page(&table.snapshot().await, args.page)?;
        }
        Command::Create { json } => {
            let draft: T::Patch = serde_json::from_str(&json).context("invalid create payload")?;
            let table = TableOrchestrator::new(TableOptions::for_resource::<T>(), service);
            let id = expect_confirmed(table.add(draft).await)?;
            print_row(&table.snapshot().await, &id)?;
        }
        Command::Update { json } => {
            let patch: T::Patch = serde_json::from_str(&json).context("invalid update payload")?;
            let id = T::patch_id(&patch)
                .cloned()
                .ok_or_else(|| anyhow!("update payload needs an \"id\" field"))?;
            let table = locate::<T>(service, &id).await?;
            expect_confirmed(table.update(patch).await)?;
            print_row(&table.snapshot().await, &id)?;
        }
        Command::Delete { id } => {
            let id = parse_id(&id);
            let table = locate::<T>(service, &id).await?;
            expect_confirmed(table.remove(id.clone()).await)?;
            println!("deleted {} {id}", T::COLLECTION);
        }
        Command::Watch(args) => {
            let push = WsPushConnection::connect(server_url).await?;
            let options = page_options::<T>(&args);
            let table = TableOrchestrator::new_with_push(options, service, Arc::new(push));
            table.mount().await;
            expect_loaded(table.change_query(|query| apply_page_args(query, &args)).await)?;
            watch(&table, args.page).await?;
        }
    }
    Ok(())
}

fn page_options<T: Resource>(args: &PageArgs) -> TableOptions {
    TableOptions::for_resource::<T>().with_page_size(args.page_size)
}

fn apply_page_args(query: &mut table_core::QueryController, args: &PageArgs) {
    if let Some(search) = &args.search {
        query.set_search(search.clone());
    }
    for (field, value) in &args.filters {
        query.set_filter(field.clone(), Value::String(value.clone()));
    }
    if let Some(field) = &args.sort {
        let direction = if args.desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        query.set_sort(field.clone(), direction);
    }
    query.set_page_size(args.page_size);
    query.set_page(args.page);
}

/// Table whose current page holds exactly the row keyed `id`.
async fn locate<T>(
    service: Arc<RestEntityService<T>>,
    id: &EntityId,
) -> Result<Arc<TableOrchestrator<T>>>
where
    T: Resource,
    T::Patch: Serialize,
{
    let table = TableOrchestrator::new(TableOptions::for_resource::<T>(), service);
    let outcome = table
        .change_query(|query| {
            query.set_filter("id", Value::String(id.to_string()));
        })
        .await;
    expect_loaded(outcome)?;
    if table.snapshot().await.row(id).is_none() {
        bail!("{} {id} does not exist", T::COLLECTION);
    }
    Ok(table)
}

fn expect_loaded(outcome: LoadOutcome) -> Result<()> {
    match outcome {
        LoadOutcome::Loaded { .. } => Ok(()),
        LoadOutcome::Failed(error) => Err(anyhow!(error)).context("loading page failed"),
        other => bail!("page load did not complete: {other:?}"),
    }
}

fn expect_confirmed(outcome: MutationOutcome) -> Result<EntityId> {
    match outcome {
        MutationOutcome::Confirmed(id) => Ok(id),
        MutationOutcome::RolledBack(error) | MutationOutcome::Rejected(error) => {
            Err(anyhow!(error))
        }
        other => bail!("mutation did not complete: {other:?}"),
    }
}

fn print_row<T: Resource>(snapshot: &TableSnapshot<T>, id: &EntityId) -> Result<()> {
    let row = snapshot
        .row(id)
        .ok_or_else(|| anyhow!("{} {id} is not on the current page", T::COLLECTION))?;
    println!("{}", serde_json::to_string_pretty(row.entity.as_ref())?);
    Ok(())
}

fn print_page<T: Resource>(snapshot: &TableSnapshot<T>, page: usize) -> Result<()> {
    for entity in snapshot.entities() {
        println!("{}", serde_json::to_string(entity)?);
    }
    println!(
        "-- page {page}: {} of {} {}",
        snapshot.rows.len(),
        snapshot.total_count,
        T::COLLECTION
    );
    Ok(())
}

/// Prints the page once, then every row whose entity changed, until Ctrl-C.
async fn watch<T: Resource>(table: &Arc<TableOrchestrator<T>>, page: usize) -> Result<()> {
    let mut events = table.subscribe_events();
    let mut previous = table.snapshot().await;
    print_page(&previous, page)?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(TableEvent::StateChanged { .. }) => {
                    let current = table.snapshot().await;
                    print_changes(&previous, &current)?;
                    previous = current;
                }
                Ok(TableEvent::Notice(notice)) => {
                    if let NoticeLevel::Failure(kind) = notice.level {
                        warn!(?kind, message = %notice.message, "table notice");
                    }
                }
                Err(RecvError::Lagged(skipped)) => debug!(skipped, "watch: skipped table events"),
                Err(RecvError::Closed) => break,
            },
        }
    }
    table.unmount().await;
    Ok(())
}

fn print_changes<T: Resource>(
    previous: &TableSnapshot<T>,
    current: &TableSnapshot<T>,
) -> Result<()> {
    let before: BTreeMap<_, _> = previous
        .rows
        .iter()
        .map(|row| (row.id().clone(), &row.entity))
        .collect();
    for row in &current.rows {
        let unchanged = before
            .get(row.id())
            .is_some_and(|entity| Arc::ptr_eq(entity, &row.entity));
        if !unchanged {
            println!("changed {}", serde_json::to_string(row.entity.as_ref())?);
        }
    }
    Ok(())
}
