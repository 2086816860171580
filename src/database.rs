//! SQLite collection store
//!
//! Uses parameterized queries exclusively (no SQL string concatenation).
//! Snapshot batches are written in a single transaction so a failed batch
//! leaves no partial rows behind.
//!
//! Prices are stored as decimal TEXT to keep them exact.

use crate::error::{Result, SyncError};
use crate::models::{Card, CollectionStats, NewCard, PriceSnapshot};
use crate::pipeline::CardStore;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row, Transaction};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

/// Result type for database operations
pub type DbResult<T> = rusqlite::Result<T>;

/// Initialize the database schema
///
/// Creates tables if they don't exist:
/// - `cards`: the tracked collection
/// - `price_snapshots`: append-only price observations per card
pub fn init_schema(conn: &Connection) -> DbResult<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;

        CREATE TABLE IF NOT EXISTS cards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            set_code TEXT NOT NULL,
            collector_number TEXT NOT NULL,
            foil INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE (set_code, collector_number, foil)
        );

        -- One row per priced observation; the newest row is the current price
        CREATE TABLE IF NOT EXISTS price_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            card_id INTEGER NOT NULL,
            old_price TEXT NOT NULL,
            last_price TEXT NOT NULL,
            price_change TEXT NOT NULL,
            observed_at TEXT NOT NULL,
            FOREIGN KEY (card_id) REFERENCES cards(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_price_snapshots_card
            ON price_snapshots(card_id, observed_at);
        ",
    )?;

    log::info!("Database schema initialized");
    Ok(())
}

/// Latest snapshot per card, ranked newest first
const LATEST_SNAPSHOT: &str = "
    SELECT card_id, last_price,
           ROW_NUMBER() OVER (PARTITION BY card_id ORDER BY observed_at DESC, id DESC) AS rn
    FROM price_snapshots";

/// Insert cards, ignoring ones already in the collection
///
/// Returns the number of cards actually added.
pub fn insert_cards(conn: &mut Connection, cards: &[NewCard]) -> DbResult<usize> {
    let tx = conn.transaction()?;
    let count = insert_cards_tx(&tx, cards)?;
    tx.commit()?;
    Ok(count)
}

fn insert_cards_tx(tx: &Transaction<'_>, cards: &[NewCard]) -> DbResult<usize> {
    let mut stmt = tx.prepare_cached(
        "INSERT OR IGNORE INTO cards (name, set_code, collector_number, foil)
         VALUES (?1, ?2, ?3, ?4)",
    )?;

    let mut count = 0;
    for card in cards {
        count += stmt.execute(params![
            &card.name,
            card.set_code.to_lowercase(),
            &card.collector_number,
            card.foil,
        ])?;
    }

    log::debug!("Inserted {} of {} cards", count, cards.len());
    Ok(count)
}

/// Remove a card; its snapshots go with it
///
/// Returns false when no card had this ID.
pub fn delete_card(conn: &Connection, card_id: i64) -> DbResult<bool> {
    let deleted = conn.execute("DELETE FROM cards WHERE id = ?1", params![card_id])?;
    Ok(deleted > 0)
}

/// One page of cards with their current price, ordered by card ID
pub fn get_cards_page(conn: &Connection, offset: usize, limit: usize) -> DbResult<Vec<Card>> {
    let sql = format!(
        "SELECT c.id, c.name, c.set_code, c.collector_number, c.foil, ps.last_price
         FROM cards c
         LEFT JOIN ({}) ps ON ps.card_id = c.id AND ps.rn = 1
         ORDER BY c.id
         LIMIT ?1 OFFSET ?2",
        LATEST_SNAPSHOT
    );
    let mut stmt = conn.prepare_cached(&sql)?;

    let cards: DbResult<Vec<Card>> = stmt
        .query_map(params![limit as i64, offset as i64], |row| {
            Ok(Card {
                id: row.get(0)?,
                name: row.get(1)?,
                set_code: row.get(2)?,
                collector_number: row.get(3)?,
                foil: row.get(4)?,
                last_price: decimal_column(row, 5)?,
            })
        })?
        .collect();
    cards
}

/// Append price snapshots, all of them or none
pub fn insert_snapshots(conn: &mut Connection, snapshots: &[PriceSnapshot]) -> DbResult<usize> {
    let tx = conn.transaction()?;
    let count = insert_snapshots_tx(&tx, snapshots)?;
    tx.commit()?;
    Ok(count)
}

fn insert_snapshots_tx(tx: &Transaction<'_>, snapshots: &[PriceSnapshot]) -> DbResult<usize> {
    let mut stmt = tx.prepare_cached(
        "INSERT INTO price_snapshots
         (card_id, old_price, last_price, price_change, observed_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;

    for snapshot in snapshots {
        stmt.execute(params![
            snapshot.card_id,
            snapshot.old_price.to_string(),
            snapshot.last_price.to_string(),
            snapshot.price_change.to_string(),
            format_timestamp(&snapshot.observed_at),
        ])?;
    }

    Ok(snapshots.len())
}

/// All snapshots of a card, oldest first
pub fn get_card_history(conn: &Connection, card_id: i64) -> DbResult<Vec<PriceSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT card_id, old_price, last_price, price_change, observed_at
         FROM price_snapshots
         WHERE card_id = ?1
         ORDER BY observed_at ASC, id ASC",
    )?;

    let history: DbResult<Vec<PriceSnapshot>> = stmt
        .query_map(params![card_id], |row| {
            Ok(PriceSnapshot {
                card_id: row.get(0)?,
                old_price: required_decimal(row, 1)?,
                last_price: required_decimal(row, 2)?,
                price_change: required_decimal(row, 3)?,
                observed_at: timestamp_column(row, 4)?,
            })
        })?
        .collect();
    history
}

/// Card counts and the total value of the collection
pub fn get_collection_stats(conn: &Connection) -> DbResult<CollectionStats> {
    let (total_cards, foil_cards, unique_sets): (i64, i64, i64) = conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(foil), 0), COUNT(DISTINCT set_code) FROM cards",
        [],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )?;

    // Summed in Rust, SQLite would add the TEXT prices as floats
    let sql = format!(
        "SELECT ps.last_price FROM cards c JOIN ({}) ps ON ps.card_id = c.id AND ps.rn = 1",
        LATEST_SNAPSHOT
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut total_value = Decimal::ZERO;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        total_value += required_decimal(row, 0)?;
    }

    Ok(CollectionStats {
        total_cards,
        foil_cards,
        unique_sets,
        total_value,
    })
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    // Fixed width so TEXT ordering matches time ordering
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decimal_column(row: &Row<'_>, idx: usize) -> DbResult<Option<Decimal>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|s| {
        Decimal::from_str(&s)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn required_decimal(row: &Row<'_>, idx: usize) -> DbResult<Decimal> {
    decimal_column(row, idx)?.ok_or(rusqlite::Error::InvalidColumnType(
        idx,
        "price".to_string(),
        Type::Null,
    ))
}

fn timestamp_column(row: &Row<'_>, idx: usize) -> DbResult<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

/// Shared SQLite connection usable from async code
///
/// Queries run on tokio's blocking pool.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database file and initialize the schema
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        log::info!("Opened database: {}", path.display());
        Self::from_connection(conn)
    }

    /// Fresh in-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` with the connection on the blocking pool
    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> DbResult<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|_| SyncError::LockPoisoned)?;
            f(&mut conn).map_err(SyncError::from)
        })
        .await?
    }

    pub async fn insert_cards(&self, cards: Vec<NewCard>) -> Result<usize> {
        self.with_conn(move |conn| insert_cards(conn, &cards)).await
    }

    pub async fn delete_card(&self, card_id: i64) -> Result<bool> {
        self.with_conn(move |conn| delete_card(conn, card_id)).await
    }

    pub async fn card_history(&self, card_id: i64) -> Result<Vec<PriceSnapshot>> {
        self.with_conn(move |conn| get_card_history(conn, card_id)).await
    }

    pub async fn collection_stats(&self) -> Result<CollectionStats> {
        self.with_conn(|conn| get_collection_stats(conn)).await
    }
}

impl CardStore for SqliteStore {
    async fn fetch_cards_page(&self, offset: usize, limit: usize) -> Result<Vec<Card>> {
        self.with_conn(move |conn| get_cards_page(conn, offset, limit)).await
    }

    async fn persist_snapshots(&self, snapshots: &[PriceSnapshot]) -> Result<()> {
        let snapshots = snapshots.to_vec();
        let count = self
            .with_conn(move |conn| insert_snapshots(conn, &snapshots))
            .await?;
        log::debug!("Committed {} price snapshots", count);
        Ok(())
    }
}
