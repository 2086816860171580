//! Price Sync - MTG collection price reconciliation job
//!
//! Runs one reconciliation pass by default; `import`, `stats`, `history` and
//! `remove` manage the collection itself.

use clap::{Parser, Subcommand};
use price_sync::config::{
    DEFAULT_COMMIT_SIZE, DEFAULT_EXCHANGE_RATE, DEFAULT_MAX_REQUESTS_PER_SECOND,
};
use price_sync::exchange::OPEN_EXCHANGE_URL;
use price_sync::scryfall::SCRYFALL_API_URL;
use price_sync::{
    import_cards, ExchangeClient, Pipeline, PipelineConfig, RunSummary, ScryfallClient,
    SqliteStore, StopReason,
};
use rust_decimal::Decimal;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

/// MTG collection price reconciliation
#[derive(Parser, Debug)]
#[command(name = "price_sync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the SQLite database file
    #[arg(short, long, env = "PRICE_SYNC_DATABASE", default_value_t = default_db_path())]
    database: String,

    /// Cards per page and per committed batch
    #[arg(long, env = "PRICE_SYNC_COMMIT_SIZE", default_value_t = DEFAULT_COMMIT_SIZE)]
    commit_size: usize,

    /// Rate used when the exchange service is unavailable
    #[arg(long, env = "PRICE_SYNC_DEFAULT_EXCHANGE_RATE", default_value_t = DEFAULT_EXCHANGE_RATE)]
    default_exchange_rate: Decimal,

    /// Maximum price lookups per second
    #[arg(long, env = "PRICE_SYNC_MAX_REQUESTS_PER_SECOND", default_value_t = DEFAULT_MAX_REQUESTS_PER_SECOND)]
    max_requests_per_second: u32,

    /// Seconds before a run stops taking on new work
    #[arg(long, env = "PRICE_SYNC_TIMEOUT_SECS", default_value_t = 3600)]
    timeout_secs: u64,

    /// Exchange rate endpoint returning USD conversion rates
    #[arg(long, env = "PRICE_SYNC_EXCHANGE_URL", default_value = OPEN_EXCHANGE_URL)]
    exchange_url: String,

    /// Target currency code
    #[arg(long, env = "PRICE_SYNC_CURRENCY", default_value = "BRL")]
    currency: String,

    /// Scryfall API root
    #[arg(long, env = "PRICE_SYNC_SCRYFALL_URL", default_value = SCRYFALL_API_URL)]
    scryfall_url: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reconcile prices for the whole collection (default)
    Run,
    /// Load cards from a card list file
    Import {
        /// One card per line: name: <name>, set_name: <set>, collector_number: <n>, foil: <true|false>
        file: PathBuf,
    },
    /// Show collection totals
    Stats,
    /// Show the price history of a card
    History { card_id: i64 },
    /// Remove a card and its price history
    Remove { card_id: i64 },
}

/// Returns the default database path: ~/.local/share/price_sync/collection.db
fn default_db_path() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("price_sync")
        .join("collection.db")
        .to_string_lossy()
        .to_string()
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let db_path = PathBuf::from(&args.database);

    log::info!("Starting price_sync...");
    log::info!("Database path: {}", db_path.display());

    let store = match open_store(&db_path) {
        Ok(store) => store,
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let config = PipelineConfig {
        commit_size: args.commit_size,
        default_exchange_rate: args.default_exchange_rate,
        max_requests_per_second: args.max_requests_per_second,
    };

    let code = match &args.command {
        None | Some(Command::Run) => run(&args, store, config).await,
        Some(Command::Import { file }) => import(&store, file, config.commit_size).await,
        Some(Command::Stats) => stats(&store).await,
        Some(Command::History { card_id }) => history(&store, *card_id).await,
        Some(Command::Remove { card_id }) => remove(&store, *card_id).await,
    };

    std::process::exit(code);
}

fn open_store(db_path: &Path) -> price_sync::Result<SqliteStore> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
            log::info!("Created directory: {}", parent.display());
        }
    }
    SqliteStore::open(db_path)
}

async fn run(args: &Args, store: SqliteStore, config: PipelineConfig) -> i32 {
    let prices = ScryfallClient::with_base_url(&args.scryfall_url);
    let exchange = ExchangeClient::new(&args.exchange_url, &args.currency);

    let pipeline = match Pipeline::new(store, prices, exchange, config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return 2;
        }
    };

    let Some(deadline) = run_deadline(Instant::now(), args.timeout_secs) else {
        log::error!("Invalid configuration: timeout of {}s is too large", args.timeout_secs);
        return 2;
    };

    let summary = tokio::select! {
        result = pipeline.run(deadline) => match result {
            Ok(summary) => summary,
            Err(e) => {
                log::error!("Reconciliation failed: {}", e);
                return 1;
            }
        },
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted, committed batches are kept");
            return 130;
        }
    };

    match pipeline.store().collection_stats().await {
        Ok(stats) => log::info!(
            "Collection: {} cards ({} foil) across {} sets, total value {} {}",
            stats.total_cards,
            stats.foil_cards,
            stats.unique_sets,
            stats.total_value,
            pipeline.exchange_source().currency()
        ),
        Err(e) => log::warn!("Failed to read collection stats: {}", e),
    }

    exit_code(&summary)
}

fn run_deadline(start: Instant, timeout_secs: u64) -> Option<Instant> {
    start.checked_add(Duration::from_secs(timeout_secs))
}

/// Non-zero when the collection could not be read or nothing priced was kept
fn exit_code(summary: &RunSummary) -> i32 {
    match summary.stop_reason {
        StopReason::StoreReadFailed => 1,
        StopReason::DeadlineExceeded => {
            log::warn!("Run stopped at the deadline; remaining cards wait for the next run");
            0
        }
        StopReason::Exhausted if summary.priced > 0 && summary.updated == 0 => 1,
        StopReason::Exhausted => 0,
    }
}

async fn import(store: &SqliteStore, file: &Path, batch_size: usize) -> i32 {
    match import_cards(store, file, batch_size).await {
        Ok(summary) => {
            println!(
                "Imported {} cards ({} already present, {} invalid lines)",
                summary.inserted, summary.duplicates, summary.invalid
            );
            if summary.failed > 0 {
                1
            } else {
                0
            }
        }
        Err(e) => {
            log::error!("Import failed: {}", e);
            1
        }
    }
}

async fn stats(store: &SqliteStore) -> i32 {
    match store.collection_stats().await {
        Ok(stats) => {
            println!("Cards:       {}", stats.total_cards);
            println!("Foil cards:  {}", stats.foil_cards);
            println!("Sets:        {}", stats.unique_sets);
            println!("Total value: {}", stats.total_value);
            0
        }
        Err(e) => {
            log::error!("Failed to read collection stats: {}", e);
            1
        }
    }
}

async fn history(store: &SqliteStore, card_id: i64) -> i32 {
    match store.card_history(card_id).await {
        Ok(snapshots) if snapshots.is_empty() => {
            println!("No price history for card {}", card_id);
            0
        }
        Ok(snapshots) => {
            println!("{:<27} {:>12} {:>12} {:>12}", "Observed", "Old", "New", "Change");
            for snapshot in snapshots {
                println!(
                    "{:<27} {:>12} {:>12} {:>12}",
                    snapshot.observed_at.to_rfc3339(),
                    snapshot.old_price,
                    snapshot.last_price,
                    snapshot.price_change
                );
            }
            0
        }
        Err(e) => {
            log::error!("Failed to read price history: {}", e);
            1
        }
    }
}

async fn remove(store: &SqliteStore, card_id: i64) -> i32 {
    match store.delete_card(card_id).await {
        Ok(true) => {
            println!("Removed card {}", card_id);
            0
        }
        Ok(false) => {
            println!("No card with id {}", card_id);
            1
        }
        Err(e) => {
            log::error!("Failed to remove card: {}", e);
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(stop_reason: StopReason, priced: usize, updated: i64) -> RunSummary {
        RunSummary {
            updated,
            pages: 1,
            priced,
            skipped: 0,
            failed_batches: 0,
            exchange_rate: DEFAULT_EXCHANGE_RATE,
            used_default_rate: false,
            stop_reason,
        }
    }

    #[test]
    fn args_default_to_run() {
        let args = Args::try_parse_from(["price_sync"]).unwrap();
        assert!(args.command.is_none());
        assert_eq!(args.commit_size, DEFAULT_COMMIT_SIZE);
        assert_eq!(args.default_exchange_rate, DEFAULT_EXCHANGE_RATE);
        assert_eq!(args.currency, "BRL");
    }

    #[test]
    fn args_parse_subcommands() {
        let args = Args::try_parse_from(["price_sync", "history", "42"]).unwrap();
        assert!(matches!(args.command, Some(Command::History { card_id: 42 })));

        let args = Args::try_parse_from([
            "price_sync",
            "--commit-size",
            "50",
            "--default-exchange-rate",
            "5.25",
            "import",
            "cards.txt",
        ])
        .unwrap();
        assert_eq!(args.commit_size, 50);
        assert_eq!(args.default_exchange_rate, "5.25".parse::<Decimal>().unwrap());
        assert!(matches!(args.command, Some(Command::Import { .. })));
    }

    #[test]
    fn oversized_timeout_has_no_deadline() {
        let now = Instant::now();

        assert_eq!(run_deadline(now, 60), Some(now + Duration::from_secs(60)));
        assert!(run_deadline(now, u64::MAX).is_none());
    }

    #[test]
    fn exit_code_reflects_stop_reason() {
        assert_eq!(exit_code(&summary(StopReason::Exhausted, 3, 3)), 0);
        assert_eq!(exit_code(&summary(StopReason::Exhausted, 0, 0)), 0);
        assert_eq!(exit_code(&summary(StopReason::Exhausted, 3, 0)), 1);
        assert_eq!(exit_code(&summary(StopReason::DeadlineExceeded, 3, 1)), 0);
        assert_eq!(exit_code(&summary(StopReason::StoreReadFailed, 0, 0)), 1);
    }
}
