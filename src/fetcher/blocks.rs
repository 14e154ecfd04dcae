use std::collections::BTreeMap;

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    node_client::{Error, NodeRpc, types::Block},
    retry::{new_backoff_limited, retry},
};

use super::{FetchReport, Skip, pool::run_pool};

pub async fn get_chain_height<C: NodeRpc>(
    node: &C,
    cancel_token: CancellationToken,
) -> Result<u64> {
    retry(
        || node.get_block_count(),
        "get block count",
        new_backoff_limited(),
        Error::is_transient,
        cancel_token,
    )
    .await
}

/// Heights of the `n` most recent blocks, newest first, clamped to the chain length.
pub fn plan_heights(chain_height: u64, n: u64) -> Vec<u64> {
    let available = chain_height.saturating_add(1);
    let n = if n > available {
        warn!(
            "Requested {} blocks, but only {} are available. Adjusting to {}.",
            n, available, available
        );
        available
    } else {
        n
    };
    (0..n).map(|i| chain_height - i).collect()
}

async fn fetch_block<C: NodeRpc>(node: &C, height: u64) -> Result<Block, Error> {
    let hash = node.get_block_hash(height).await?;
    node.get_block(&hash).await
}

/// Fetches every height concurrently; heights that fail are logged and left out.
pub async fn fetch_blocks<C: NodeRpc>(
    node: C,
    heights: Vec<u64>,
    workers: usize,
    cancel_token: CancellationToken,
) -> (BTreeMap<u64, Block>, FetchReport) {
    info!(
        "Starting block data retrieval of {} blocks with {} workers",
        heights.len(),
        workers
    );
    let mut report = FetchReport::new(heights.len());
    let (dispatcher, mut rx) = run_pool(heights, workers, cancel_token, move |height| {
        let node = node.clone();
        async move { (height, fetch_block(&node, height).await) }
    });

    let mut blocks = BTreeMap::new();
    while let Some((height, result)) = rx.recv().await {
        match result {
            Ok(block) => {
                report.record_fetched();
                blocks.insert(height, block);
            }
            Err(e) => {
                let skip = Skip::from(&e);
                match &e {
                    Error::MalformedResponse { output, .. } => {
                        error!("Malformed block {}: {}; output: {}", height, e, output)
                    }
                    _ => error!("Failed to retrieve block {}: {}", height, e),
                }
                report.record_skip(skip);
            }
        }
        report.log_progress("block", &height);
    }

    if let Err(e) = dispatcher.await {
        error!("Block dispatcher panicked on join: {}", e);
    }
    info!("Block retrieval finished: {}", report);
    (blocks, report)
}

/// Resolves the chain height, then fetches the latest `n` blocks.
pub async fn fetch_latest_blocks<C: NodeRpc>(
    node: C,
    n: u64,
    workers: usize,
    cancel_token: CancellationToken,
) -> Result<(BTreeMap<u64, Block>, FetchReport)> {
    let chain_height = get_chain_height(&node, cancel_token.clone()).await?;
    info!("Latest block height: {}", chain_height);
    let heights = plan_heights(chain_height, n);
    Ok(fetch_blocks(node, heights, workers, cancel_token).await)
}
