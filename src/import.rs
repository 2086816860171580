//! Card list import
//!
//! Reads one card per line in the form
//!
//! ```text
//! name: Lightning Bolt, set_name: lea, collector_number: 161, foil: false
//! ```
//!
//! Blank lines are skipped; malformed lines are logged and counted.

use crate::database::SqliteStore;
use crate::error::Result;
use crate::models::NewCard;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::OnceLock;

fn card_line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^name:\s*(?P<name>.+?),\s*set_name:\s*(?P<set>[^,]+?),\s*collector_number:\s*(?P<number>[^,]+?),\s*foil:\s*(?P<foil>\w+)\s*$",
        )
        .expect("card line pattern is valid")
    })
}

/// Outcome of an import
#[derive(Debug, Default, PartialEq)]
pub struct ImportSummary {
    /// Lines that parsed into a card
    pub parsed: usize,
    /// Cards added to the collection
    pub inserted: usize,
    /// Cards already in the collection
    pub duplicates: usize,
    /// Lines that could not be parsed
    pub invalid: usize,
    /// Cards lost to failed batch inserts
    pub failed: usize,
}

/// Parse a single card line
pub fn parse_card_line(line: &str) -> Option<NewCard> {
    let caps = card_line_pattern().captures(line.trim())?;

    let foil = match caps["foil"].to_lowercase().as_str() {
        "true" => true,
        "false" => false,
        _ => return None,
    };

    let name = caps["name"].trim();
    let collector_number = caps["number"].trim();
    if name.is_empty() || collector_number.is_empty() {
        return None;
    }

    Some(NewCard {
        name: name.to_string(),
        set_code: caps["set"].trim().to_lowercase(),
        collector_number: collector_number.to_string(),
        foil,
    })
}

/// Parse every line of a card list, returning the cards and the invalid line count
pub fn read_card_list<R: BufRead>(reader: R) -> Result<(Vec<NewCard>, usize)> {
    let mut cards = Vec::new();
    let mut invalid = 0;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match parse_card_line(&line) {
            Some(card) => cards.push(card),
            None => {
                log::warn!("Skipping malformed card line {}: {:?}", index + 1, line);
                invalid += 1;
            }
        }
    }

    Ok((cards, invalid))
}

/// Import a card list file into the store in batches of `batch_size`
pub async fn import_cards(
    store: &SqliteStore,
    path: &Path,
    batch_size: usize,
) -> Result<ImportSummary> {
    log::info!("Importing cards from {}", path.display());

    let file = File::open(path)?;
    let (cards, invalid) = read_card_list(BufReader::new(file))?;

    let mut summary = ImportSummary {
        parsed: cards.len(),
        invalid,
        ..Default::default()
    };

    for batch in cards.chunks(batch_size.max(1)) {
        match store.insert_cards(batch.to_vec()).await {
            Ok(inserted) => {
                summary.inserted += inserted;
                summary.duplicates += batch.len() - inserted;
            }
            Err(e) => {
                log::warn!("Failed to insert batch of {} cards: {}", batch.len(), e);
                summary.failed += batch.len();
            }
        }
    }

    log::info!(
        "Imported {} cards ({} duplicates, {} invalid lines, {} failed)",
        summary.inserted,
        summary.duplicates,
        summary.invalid,
        summary.failed
    );

    Ok(summary)
}
