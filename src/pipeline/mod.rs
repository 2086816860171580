//! Price reconciliation pipeline
//!
//! One run walks the collection page by page, prices every card against the
//! price source at a throttled pace, converts to the target currency and
//! appends the resulting snapshots to the store.
//!
//! Pricing and persisting run as two concurrent stages joined by a one-slot
//! handoff. A page is handed to the writer only after the previous page has
//! been fully written, so writes happen in page order and at most one priced
//! page waits in memory while the next one is being priced.
//!
//! Partial failures never fail the run: skipped cards, discarded batches and
//! an unreachable exchange service only show up in the logs and in the
//! returned [`RunSummary`].

mod rate_limit;
mod sources;

pub use rate_limit::RateLimiter;
pub use sources::{CardStore, ExchangeSource, PriceSource};

use crate::config::PipelineConfig;
use crate::error::{Result, SyncError};
use crate::models::{Card, PriceSnapshot};
use chrono::Utc;
use rust_decimal::Decimal;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant};

/// Why a run stopped reading pages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The store returned an empty page
    Exhausted,
    /// The run deadline passed during a page read, a price lookup or a write
    DeadlineExceeded,
    /// The store failed to return a page
    StoreReadFailed,
}

/// Outcome of one reconciliation run
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    /// Cards whose new snapshot was written
    pub updated: i64,
    /// Non-empty pages read from the store
    pub pages: usize,
    /// Cards that received a price
    pub priced: usize,
    /// Cards skipped because their price lookup failed
    pub skipped: usize,
    /// Batches discarded because the write failed
    pub failed_batches: usize,
    /// Conversion rate applied to every price of the run
    pub exchange_rate: Decimal,
    pub used_default_rate: bool,
    pub stop_reason: StopReason,
}

/// A priced page travelling from the pricing stage to the writer
struct PricedBatch {
    offset: usize,
    snapshots: Vec<PriceSnapshot>,
    /// Signalled once the writer is done with this batch
    done: oneshot::Sender<()>,
}

/// Snapshots produced for one page
#[derive(Default)]
struct PricedCards {
    snapshots: Vec<PriceSnapshot>,
    skipped: usize,
    deadline_hit: bool,
}

struct ProducerReport {
    pages: usize,
    priced: usize,
    skipped: usize,
    stop_reason: StopReason,
}

#[derive(Default)]
struct WriterReport {
    updated: i64,
    failed_batches: usize,
    deadline_hit: bool,
}

/// Reconciles card prices against a price source and records snapshots
pub struct Pipeline<S, P, X> {
    store: S,
    prices: P,
    exchange: X,
    config: PipelineConfig,
}

impl<S, P, X> Pipeline<S, P, X>
where
    S: CardStore,
    P: PriceSource,
    X: ExchangeSource,
{
    /// Create a pipeline, rejecting an unusable configuration
    pub fn new(store: S, prices: P, exchange: X, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            prices,
            exchange,
            config,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn price_source(&self) -> &P {
        &self.prices
    }

    pub fn exchange_source(&self) -> &X {
        &self.exchange
    }

    /// Run one full reconciliation, stopping early once `deadline` passes.
    ///
    /// Always returns `Ok`; the error arm is reserved for failures that should
    /// abort the job outright.
    pub async fn run(&self, deadline: Instant) -> Result<RunSummary> {
        log::info!(
            "Starting price reconciliation (commit size: {}, max {} requests/s)",
            self.config.commit_size,
            self.config.max_requests_per_second
        );

        let (exchange_rate, used_default_rate) = self.exchange_rate(deadline).await;

        let (tx, rx) = mpsc::channel(1);
        let (produced, written) = tokio::join!(
            self.price_pages(exchange_rate, deadline, tx),
            self.write_batches(deadline, rx)
        );

        let stop_reason = if written.deadline_hit {
            StopReason::DeadlineExceeded
        } else {
            produced.stop_reason
        };

        let summary = RunSummary {
            updated: written.updated,
            pages: produced.pages,
            priced: produced.priced,
            skipped: produced.skipped,
            failed_batches: written.failed_batches,
            exchange_rate,
            used_default_rate,
            stop_reason,
        };

        log::info!(
            "Reconciliation finished: {} cards updated, {} priced, {} skipped, {} failed batches ({:?})",
            summary.updated,
            summary.priced,
            summary.skipped,
            summary.failed_batches,
            summary.stop_reason
        );

        Ok(summary)
    }

    /// Fetch the run's exchange rate, falling back to the configured default
    async fn exchange_rate(&self, deadline: Instant) -> (Decimal, bool) {
        let fetched = within_deadline(deadline, self.exchange.fetch_rate())
            .await
            .and_then(|rate| {
                if rate > Decimal::ZERO {
                    Ok(rate)
                } else {
                    Err(SyncError::InvalidPrice(format!(
                        "non-positive exchange rate {}",
                        rate
                    )))
                }
            });

        match fetched {
            Ok(rate) => {
                log::info!("Using exchange rate {}", rate);
                (rate, false)
            }
            Err(e) => {
                log::error!(
                    "Failed to fetch exchange rate, using default {}: {}",
                    self.config.default_exchange_rate,
                    e
                );
                (self.config.default_exchange_rate, true)
            }
        }
    }

    /// Pricing stage: read pages, price their cards, hand batches to the writer
    async fn price_pages(
        &self,
        exchange_rate: Decimal,
        deadline: Instant,
        tx: mpsc::Sender<PricedBatch>,
    ) -> ProducerReport {
        let mut report = ProducerReport {
            pages: 0,
            priced: 0,
            skipped: 0,
            stop_reason: StopReason::Exhausted,
        };
        let mut limiter = RateLimiter::per_second(self.config.max_requests_per_second);
        let mut previous_done: Option<oneshot::Receiver<()>> = None;
        let mut offset = 0;

        loop {
            let page = within_deadline(
                deadline,
                self.store.fetch_cards_page(offset, self.config.commit_size),
            )
            .await;

            let cards = match page {
                Ok(cards) => cards,
                Err(e) if e.is_deadline_exceeded() => {
                    log::error!("Deadline exceeded while fetching cards at offset {}", offset);
                    report.stop_reason = StopReason::DeadlineExceeded;
                    break;
                }
                Err(e) => {
                    log::error!("Failed to fetch cards at offset {}: {}", offset, e);
                    report.stop_reason = StopReason::StoreReadFailed;
                    break;
                }
            };

            if cards.is_empty() {
                log::debug!("No more cards to price after offset {}", offset);
                break;
            }

            report.pages += 1;
            log::info!("Pricing {} cards from offset {}", cards.len(), offset);

            let priced = self
                .price_cards(&cards, exchange_rate, deadline, &mut limiter)
                .await;
            report.priced += priced.snapshots.len();
            report.skipped += priced.skipped;

            if priced.deadline_hit {
                log::error!(
                    "Deadline exceeded while pricing cards at offset {}, dropping {} unsaved snapshots",
                    offset,
                    priced.snapshots.len()
                );
                report.stop_reason = StopReason::DeadlineExceeded;
                break;
            }

            // Hand off only once the writer has finished the previous batch
            if let Some(done) = previous_done.take() {
                if done.await.is_err() {
                    log::debug!("Writer stopped, no further pages");
                    break;
                }
            }

            let (done_tx, done_rx) = oneshot::channel();
            let batch = PricedBatch {
                offset,
                snapshots: priced.snapshots,
                done: done_tx,
            };
            if tx.send(batch).await.is_err() {
                log::debug!("Writer stopped, no further pages");
                break;
            }
            previous_done = Some(done_rx);

            offset += self.config.commit_size;
        }

        report
    }

    /// Price one page in store order, one throttled request per card
    async fn price_cards(
        &self,
        cards: &[Card],
        exchange_rate: Decimal,
        deadline: Instant,
        limiter: &mut RateLimiter,
    ) -> PricedCards {
        let mut priced = PricedCards::default();

        for card in cards {
            let observed = within_deadline(deadline, async {
                limiter.acquire().await;
                self.prices.fetch_price(card).await
            })
            .await
            .and_then(|price| PriceSnapshot::observe(card, price, exchange_rate, Utc::now()));

            match observed {
                Ok(snapshot) => {
                    log::debug!(
                        "Priced card {} ({}): {} -> {}",
                        card.id,
                        card.name,
                        snapshot.old_price,
                        snapshot.last_price
                    );
                    priced.snapshots.push(snapshot);
                }
                Err(e) if e.is_deadline_exceeded() => {
                    log_card_failure(card, &e);
                    priced.deadline_hit = true;
                    break;
                }
                Err(e) => {
                    log_card_failure(card, &e);
                    priced.skipped += 1;
                }
            }
        }

        priced
    }

    /// Writer stage: persist batches in the order they arrive
    async fn write_batches(
        &self,
        deadline: Instant,
        mut rx: mpsc::Receiver<PricedBatch>,
    ) -> WriterReport {
        let mut report = WriterReport::default();

        while let Some(batch) = rx.recv().await {
            let count = batch.snapshots.len();
            if count == 0 {
                log::info!("No price snapshots to write for offset {}", batch.offset);
                let _ = batch.done.send(());
                continue;
            }

            log::info!("Writing {} price snapshots for offset {}", count, batch.offset);
            match within_deadline(deadline, self.store.persist_snapshots(&batch.snapshots)).await {
                Ok(()) => {
                    report.updated += count as i64;
                    log::info!("Wrote {} price snapshots", count);
                }
                Err(e) if e.is_deadline_exceeded() => {
                    log::error!(
                        "Deadline exceeded while writing {} snapshots for offset {}",
                        count,
                        batch.offset
                    );
                    report.deadline_hit = true;
                    break;
                }
                Err(e) => {
                    log::warn!(
                        "Failed to write {} snapshots for offset {}, discarding batch: {}",
                        count,
                        batch.offset,
                        e
                    );
                    report.failed_batches += 1;
                }
            }

            let _ = batch.done.send(());
        }

        report
    }
}

/// Run `operation` unless `deadline` has passed, cutting it off when it does
async fn within_deadline<T, F>(deadline: Instant, operation: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if Instant::now() >= deadline {
        return Err(SyncError::DeadlineExceeded);
    }
    time::timeout_at(deadline, operation)
        .await
        .unwrap_or(Err(SyncError::DeadlineExceeded))
}

fn log_card_failure(card: &Card, err: &SyncError) {
    let reason = match err {
        SyncError::CardNotFound { .. } => "not found",
        SyncError::PriceUnavailable { .. } => "price unavailable",
        SyncError::DeadlineExceeded => "deadline exceeded",
        SyncError::InvalidPrice(_) => "invalid price",
        _ => "lookup failed",
    };
    log::warn!(
        "Skipping card, {} [card_id={}, name={:?}, set={}, collector_number={}, foil={}]: {}",
        reason,
        card.id,
        card.name,
        card.set_code,
        card.collector_number,
        card.foil,
        err
    );
}
