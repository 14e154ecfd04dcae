//! The `fetch` and `process` runs, independent of how the node is reached.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    chart,
    fetcher::{self, FetchReport},
    node_client::NodeRpc,
    stats::{self, HourlySummary},
    store::{self, DataFiles},
};

fn ensure_complete(
    what: &str,
    report: &FetchReport,
    cancel_token: &CancellationToken,
) -> Result<()> {
    if cancel_token.is_cancelled() || report.interrupted() {
        bail!("Interrupted while fetching {}, keeping previous files", what);
    }
    Ok(())
}

/// Fetches the latest `block_count` blocks and their transactions into `files`.
///
/// Both stages must run to completion before either file is written, so an
/// interrupted run leaves the previous pair on disk.
pub async fn fetch<C: NodeRpc>(
    node: C,
    files: &DataFiles,
    block_count: u64,
    workers: usize,
    cancel_token: CancellationToken,
) -> Result<(FetchReport, FetchReport)> {
    let (blocks, block_report) =
        fetcher::fetch_latest_blocks(node.clone(), block_count, workers, cancel_token.clone())
            .await?;
    ensure_complete("blocks", &block_report, &cancel_token)?;

    let (transactions, transaction_report) =
        fetcher::fetch_transactions(node, &blocks, workers, cancel_token.clone()).await;
    ensure_complete("transactions", &transaction_report, &cancel_token)?;

    store::save_blocks(&files.blocks, &blocks)?;
    store::save_transactions(&files.transactions, &transactions)?;
    Ok((block_report, transaction_report))
}

/// Aggregates whatever input is available and renders the chart.
///
/// A dataset that cannot be read is logged and treated as empty; the run only
/// fails when neither can be read. A chart that cannot be rendered is a warning.
pub fn process(
    files: &DataFiles,
    chart_path: &Path,
) -> Result<BTreeMap<DateTime<Utc>, HourlySummary>> {
    let blocks = match store::load_blocks(&files.blocks) {
        Ok(blocks) => Some(blocks),
        Err(e) => {
            error!("Error reading block data: {:#}", e);
            None
        }
    };
    let transactions = match store::load_transactions(&files.transactions) {
        Ok(transactions) => Some(transactions),
        Err(e) => {
            error!("Error reading transaction data: {:#}", e);
            None
        }
    };
    if blocks.is_none() && transactions.is_none() {
        bail!(
            "No input data: neither {} nor {} could be read",
            files.blocks.display(),
            files.transactions.display()
        );
    }

    let block_rows = stats::process_blocks(blocks.as_deref().unwrap_or_default());
    let tx_rows = stats::process_transactions(transactions.as_deref().unwrap_or_default());
    info!(
        "Processed {} blocks and {} transactions",
        block_rows.len(),
        tx_rows.len()
    );

    let difficulty = stats::hourly_closing_difficulty(&block_rows);
    let volume = stats::hourly_volume_and_fees(&tx_rows);
    let counts = stats::transactions_per_hour(&tx_rows);

    if let Err(e) = chart::render(chart_path, &volume, &counts, &difficulty) {
        warn!("Chart not rendered: {:#}", e);
    }
    Ok(stats::summarize(&volume, &counts, &difficulty))
}
