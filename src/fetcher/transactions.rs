use std::collections::BTreeMap;

use indexmap::IndexSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::node_client::{
    Error, NodeRpc,
    types::{Block, Transaction},
};

use super::{FetchReport, Skip, pool::run_pool};

/// Every txid referenced by `blocks`, first occurrence kept.
pub fn collect_txids(blocks: &BTreeMap<u64, Block>) -> IndexSet<String> {
    blocks
        .values()
        .flat_map(|block| block.txid.iter().cloned())
        .collect()
}

/// Fetches the transactions referenced by `blocks`, in completion order.
pub async fn fetch_transactions<C: NodeRpc>(
    node: C,
    blocks: &BTreeMap<u64, Block>,
    workers: usize,
    cancel_token: CancellationToken,
) -> (Vec<Transaction>, FetchReport) {
    let txids: Vec<String> = collect_txids(blocks).into_iter().collect();
    info!(
        "Starting transaction data retrieval of {} transactions with {} workers",
        txids.len(),
        workers
    );
    let mut report = FetchReport::new(txids.len());
    let (dispatcher, mut rx) = run_pool(txids, workers, cancel_token, move |txid| {
        let node = node.clone();
        async move {
            let result = node.get_raw_transaction(&txid).await;
            (txid, result)
        }
    });

    let mut transactions = vec![];
    while let Some((txid, result)) = rx.recv().await {
        match result {
            Ok(tx) => {
                report.record_fetched();
                transactions.push(tx);
            }
            Err(e) => {
                let skip = Skip::from(&e);
                match (&e, skip) {
                    (_, Skip::Missing) => warn!(
                        "getrawtransaction failed for {}, transaction might not be indexed or is not in the mempool: {}",
                        txid, e
                    ),
                    (Error::MalformedResponse { output, .. }, _) => {
                        error!("Malformed transaction {}: {}; output: {}", txid, e, output)
                    }
                    _ => error!("Failed to retrieve transaction {}: {}", txid, e),
                }
                report.record_skip(skip);
            }
        }
        report.log_progress("transaction", &txid);
    }

    if let Err(e) = dispatcher.await {
        error!("Transaction dispatcher panicked on join: {}", e);
    }
    info!("Transaction retrieval finished: {}", report);
    (transactions, report)
}
