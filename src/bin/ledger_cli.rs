use std::{fs, path::PathBuf, str::FromStr, sync::Arc};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use serde::{de::DeserializeOwned, Serialize};
use stock_ledger_api::{
    config::{self, AppConfig},
    db,
    events::{Event, EventSender},
    models::{
        history::{HistoryFilter, MovementHistoryRecord},
        movement::MovementKind,
        stock_lot::{StockClass, StockLot},
    },
    services::{
        history::HistoryService,
        lot_store::{DatabaseLotStore, SharedLotStore},
        lots::LotService,
        positions::{PositionPage, PositionQuery, PositionService, QuickFilter, SortDirection, SortField},
    },
};
use tokio::sync::mpsc;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::InitSchema => {
            db::ensure_schema(&context.db)
                .await
                .context("failed to create ledger schema")?;
            println!("Ledger schema ready");
        }
        Commands::ImportLots(args) => handle_import(&context, args, cli.json).await?,
        Commands::Positions(args) => handle_positions(&context, args, cli.json).await?,
        Commands::History(args) => handle_history(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "ledger-cli", about = "Stock ledger maintenance and reporting", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the ledger tables if they do not exist
    InitSchema,
    /// Receive lots from a JSON array file
    ImportLots(ImportArgs),
    /// List lot positions
    Positions(PositionArgs),
    /// List confirmed movement history
    History(HistoryArgs),
}

#[derive(Args)]
struct ImportArgs {
    #[arg(help = "Path to a JSON file holding an array of lots")]
    file: PathBuf,
}

#[derive(Args)]
struct PositionArgs {
    #[arg(long, help = "Case-insensitive search over codes, description, supplier and entity")]
    search: Option<String>,
    #[arg(long, value_parser = StockClass::from_str, help = "domestic, direct-import or consigned")]
    stock_class: Option<StockClass>,
    #[arg(long, value_parser = parse_value::<QuickFilter>, help = "expired, expiring-soon, low-stock or reserved")]
    quick_filter: Option<QuickFilter>,
    #[arg(long, value_parser = parse_value::<SortField>, help = "Field to sort by, e.g. expiry_date")]
    sort_by: Option<SortField>,
    #[arg(long, value_parser = parse_value::<SortDirection>, help = "asc or desc")]
    sort_order: Option<SortDirection>,
    #[arg(long, value_parser = parse_value::<SortField>, help = "Flip --sort-order if this is the --sort-by field, otherwise sort by it ascending")]
    toggle: Option<SortField>,
}

#[derive(Args)]
struct HistoryArgs {
    #[arg(long, help = "Earliest movement date (YYYY-MM-DD)")]
    from: Option<NaiveDate>,
    #[arg(long, help = "Latest movement date (YYYY-MM-DD)")]
    to: Option<NaiveDate>,
    #[arg(long)]
    product_code: Option<String>,
    #[arg(long, value_parser = MovementKind::from_str, help = "inter-company or inter-warehouse")]
    movement_kind: Option<MovementKind>,
    #[arg(long, help = "Origin or destination entity")]
    entity: Option<String>,
}

/// Parses a CLI value with the same spelling the HTTP API accepts.
fn parse_value<T: DeserializeOwned>(raw: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unrecognised value '{}'", raw))
}

struct CliContext {
    config: AppConfig,
    db: Arc<db::DbPool>,
    store: SharedLotStore,
    event_sender: EventSender,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;
        let db = Arc::new(db_pool);
        let store: SharedLotStore = Arc::new(DatabaseLotStore::new(db.clone()));

        let (event_tx, mut event_rx) = mpsc::channel::<Event>(32);
        let event_sender = EventSender::new(event_tx);

        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(target: "ledger_cli", event = ?event, "received async event");
            }
        });

        Ok(Self {
            config,
            db,
            store,
            event_sender,
        })
    }

    fn lot_service(&self) -> LotService {
        LotService::new(self.store.clone(), self.event_sender.clone())
    }

    fn position_service(&self) -> PositionService {
        PositionService::new(
            self.store.clone(),
            self.config.expiry_policy(),
            self.config.low_stock_threshold,
        )
    }

    fn history_service(&self) -> HistoryService {
        HistoryService::new(self.store.clone())
    }
}

async fn handle_import(context: &CliContext, args: ImportArgs, json: bool) -> Result<()> {
    let raw = fs::read_to_string(&args.file)
        .with_context(|| format!("failed to read {}", args.file.display()))?;
    let lots: Vec<StockLot> =
        serde_json::from_str(&raw).context("lot file must be a JSON array of lots")?;

    let service = context.lot_service();
    let mut stored = Vec::with_capacity(lots.len());
    for lot in lots {
        let key = lot.key();
        let lot = service
            .receive(lot)
            .await
            .with_context(|| format!("failed to receive lot {}", key))?;
        stored.push(lot);
    }

    if json {
        print_json(&stored)?;
    } else {
        println!("Imported {} lot(s)", stored.len());
    }
    Ok(())
}

async fn handle_positions(context: &CliContext, args: PositionArgs, json: bool) -> Result<()> {
    let query = PositionQuery {
        search: args.search,
        stock_class: args.stock_class,
        quick_filter: args.quick_filter.unwrap_or_default(),
        sort_by: args.sort_by,
        sort_order: args.sort_order,
        toggle: args.toggle,
    };
    let page = context
        .position_service()
        .query(&query)
        .await
        .context("failed to query positions")?;

    if json {
        print_json(&page)?;
    } else {
        render_positions(&page);
    }
    Ok(())
}

async fn handle_history(context: &CliContext, args: HistoryArgs, json: bool) -> Result<()> {
    let filter = HistoryFilter {
        from: args.from,
        to: args.to,
        product_code: args.product_code,
        movement_kind: args.movement_kind,
        entity: args.entity,
    };
    let records = context
        .history_service()
        .query(&filter)
        .await
        .context("failed to query history")?;

    if json {
        print_json(&records)?;
    } else if records.is_empty() {
        println!("No history records matched");
    } else {
        records.iter().for_each(render_record);
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_positions(page: &PositionPage) {
    for position in &page.positions {
        let lot = &position.lot;
        println!(
            "- {} {} • {}/{} • lot {} • expires {} • available {} of {} • {} ({})",
            lot.product_code,
            lot.product_description,
            lot.legal_entity,
            lot.warehouse,
            lot.lot_code,
            lot.expiry_date
                .map(|d| d.to_string())
                .unwrap_or_else(|| "-".to_string()),
            lot.available_quantity,
            lot.total_quantity,
            position.total_cost,
            position.flags.expiry_bucket,
        );
    }
    let summary = &page.summary;
    println!(
        "{} of {} lot(s) • {} expired • {} expiring soon • {} reserved • value {}",
        page.matched,
        summary.lot_count,
        summary.expired_count,
        summary.expiring_soon_count,
        summary.reserved_count,
        summary.total_value,
    );
}

fn render_record(record: &MovementHistoryRecord) {
    println!(
        "- #{} {} {} • {} lot {} • {} unit(s) • {}/{} -> {}/{} • doc {} • by {}",
        record.id,
        record.date,
        record.movement_kind,
        record.product_code,
        record.lot_code,
        record.quantity,
        record.origin_entity.as_deref().unwrap_or("-"),
        record.origin_warehouse.as_deref().unwrap_or("-"),
        record.destination_entity.as_deref().unwrap_or("-"),
        record.destination_warehouse.as_deref().unwrap_or("-"),
        record.document,
        record.user,
    );
}
