use std::future::Future;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::amount::format_units;
use crate::config::{DetectorConfig, RetryPolicy};
use crate::fetcher::{FetchError, RetryingFetcher};
use crate::filter::TransferFilter;
use crate::gateway::{ChainGateway, GatewayError};
use crate::reporter::{self, AlertSink};
use crate::state::AddressLedger;
use crate::types::{AlertRecord, ExitSummary, RunStats, SuspicionVerdict, Transfer};

/// Fixed parameters of one monitoring run.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// Chain label written into alert records.
    pub chain: String,
    /// Coin ticker used in log lines.
    pub symbol: String,
    pub detector: DetectorConfig,
    pub retry: RetryPolicy,
}

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Chain height has not moved past the checkpoint.
    Idle { height: u64 },
    /// Blocks `from..=to` were scanned; `skipped` could not be fetched.
    Advanced {
        from: u64,
        to: u64,
        skipped: Vec<u64>,
        alerts: usize,
    },
}

/// Checkpoint the loop starts from.
///
/// With a configured start block, scanning begins at that block. Otherwise
/// only blocks produced after startup are scanned.
pub async fn initial_checkpoint<G: ChainGateway>(
    gateway: &G,
    fetcher: &RetryingFetcher,
    start_block: Option<u64>,
) -> Result<u64, FetchError<GatewayError>> {
    match start_block {
        Some(block) => Ok(block.saturating_sub(1)),
        None => fetcher.fetch("current height", || gateway.current_height()).await,
    }
}

/// Scans new blocks on a timer and raises alerts for repeated similar transfers.
///
/// Every mutation goes through `&mut self`, so two ticks can never interleave.
pub struct PollLoop<G, S> {
    gateway: G,
    sink: S,
    fetcher: RetryingFetcher,
    filter: TransferFilter,
    ledger: AddressLedger,
    /// Last block height whose transfers were fully applied.
    checkpoint: u64,
    settings: MonitorSettings,
    stats: RunStats,
}

impl<G: ChainGateway, S: AlertSink> PollLoop<G, S> {
    pub fn new(gateway: G, sink: S, settings: MonitorSettings, checkpoint: u64) -> Self {
        Self {
            gateway,
            sink,
            fetcher: RetryingFetcher::new(settings.retry),
            filter: TransferFilter::new(settings.detector.min_value, settings.detector.max_value),
            ledger: AddressLedger::new(&settings.detector),
            checkpoint,
            settings,
            stats: RunStats::default(),
        }
    }

    pub fn checkpoint(&self) -> u64 {
        self.checkpoint
    }

    pub fn ledger(&self) -> &AddressLedger {
        &self.ledger
    }

    pub fn stats(&self) -> &RunStats {
        &self.stats
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Tick every `poll_interval` until `shutdown` resolves.
    ///
    /// A tick in progress when `shutdown` fires is abandoned mid-range and the
    /// checkpoint stays where the last complete range left it. Ticks that come
    /// due while one is still running are dropped, not queued.
    pub async fn run<F>(&mut self, poll_interval: Duration, shutdown: F) -> ExitSummary
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick completes immediately; the first scan waits one period.
        interval.tick().await;
        tokio::pin!(shutdown);

        info!(
            "Watching {} from block {} (policy: {}, interval: {:?})",
            self.settings.chain,
            self.checkpoint + 1,
            self.ledger.policy(),
            poll_interval,
        );

        loop {
            let due = tokio::select! {
                _ = &mut shutdown => false,
                _ = interval.tick() => true,
            };
            if !due {
                info!("Shutdown signal received");
                break;
            }

            let ticked = tokio::select! {
                _ = &mut shutdown => None,
                result = self.tick() => Some(result),
            };
            match ticked {
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    self.stats.failed_ticks += 1;
                    warn!("Tick failed, checkpoint stays at {}: {e}", self.checkpoint);
                }
                None => {
                    info!(
                        "Shutdown signal received mid-scan, checkpoint stays at {}",
                        self.checkpoint
                    );
                    break;
                }
            }
        }

        self.summary()
    }

    /// Scan every block between the checkpoint and the current chain height.
    ///
    /// Blocks whose fetch is exhausted are logged and skipped for good; the
    /// checkpoint still moves to the observed height once the range is done.
    pub async fn tick(&mut self) -> Result<TickOutcome, FetchError<GatewayError>> {
        self.stats.ticks += 1;
        let height = self
            .fetcher
            .fetch("current height", || self.gateway.current_height())
            .await?;

        if height <= self.checkpoint {
            debug!("No new blocks (height {height}, checkpoint {})", self.checkpoint);
            return Ok(TickOutcome::Idle { height });
        }

        let from = self.checkpoint + 1;
        info!("Checking blocks from {from} to {height}");

        let mut skipped = Vec::new();
        let mut alerts = 0;
        for block in from..=height {
            let label = format!("block {block}");
            let fetched = self
                .fetcher
                .fetch(&label, || self.gateway.fetch_block_transfers(block))
                .await;
            match fetched {
                Ok(transfers) => {
                    debug!("Processing block {block} ({} transactions)", transfers.len());
                    alerts += self.apply_block(block, &transfers).await;
                    self.stats.blocks_processed += 1;
                }
                Err(e) => {
                    error!("Skipping block {block}: {e}");
                    skipped.push(block);
                    self.stats.skipped_blocks.push(block);
                }
            }
        }

        self.checkpoint = height;
        Ok(TickOutcome::Advanced {
            from,
            to: height,
            skipped,
            alerts,
        })
    }

    /// Feed one block's transfers through the filter and ledger, in order.
    async fn apply_block(&mut self, block: u64, transfers: &[Transfer]) -> usize {
        let mut alerts = 0;
        for transfer in transfers {
            self.stats.transfers_seen += 1;
            if !self.filter.accepts(transfer) {
                continue;
            }
            self.stats.transfers_matched += 1;
            if let Some(verdict) = self.ledger.record(transfer.from, transfer.value) {
                self.raise(verdict, block).await;
                alerts += 1;
            }
        }
        alerts
    }

    /// Persist a verdict before reporting it anywhere else.
    async fn raise(&mut self, verdict: SuspicionVerdict, block: u64) {
        let record = self.to_record(&verdict, block);
        self.stats.alerts_raised += 1;

        let symbol = &self.settings.symbol;
        info!(
            "Suspicious address detected: {} ({} transfers: {} {symbol})",
            record.address,
            record.transfer_count,
            record.transfers.join(", "),
        );

        let appended = self
            .fetcher
            .fetch("alert append", || self.sink.append(&record))
            .await;
        match appended {
            Ok(()) => reporter::report_alert(&record),
            Err(e) => {
                self.stats.alerts_lost += 1;
                let json = serde_json::to_string(&record).unwrap_or_default();
                error!("ALERT NOT PERSISTED for {}: {e}; record: {json}", record.address);
            }
        }
    }

    fn to_record(&self, verdict: &SuspicionVerdict, block: u64) -> AlertRecord {
        AlertRecord {
            address: verdict.address.to_checksum(None),
            transfer_count: verdict.count,
            transfers: verdict.transfers.iter().copied().map(format_units).collect(),
            block_number: block,
            chain: self.settings.chain.clone(),
            detected_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn summary(&self) -> ExitSummary {
        ExitSummary {
            chain: self.settings.chain.clone(),
            policy: self.ledger.policy(),
            checkpoint: self.checkpoint,
            ticks: self.stats.ticks,
            failed_ticks: self.stats.failed_ticks,
            blocks_processed: self.stats.blocks_processed,
            blocks_skipped: self.stats.skipped_blocks.len() as u64,
            skipped_heights: self.stats.skipped_blocks.clone(),
            transfers_seen: self.stats.transfers_seen,
            transfers_matched: self.stats.transfers_matched,
            tracked_addresses: self.ledger.tracked_addresses(),
            alerts_raised: self.stats.alerts_raised,
            alerts_lost: self.stats.alerts_lost,
        }
    }
}
