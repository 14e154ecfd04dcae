use std::{
    collections::BTreeMap,
    io,
    sync::{Arc, Mutex},
};

use anyhow::Result;
use serde_json::json;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use nexa_stats::{
    fetcher::{
        self, FetchReport, collect_txids, fetch_blocks, fetch_latest_blocks, fetch_transactions,
        get_chain_height, plan_heights,
    },
    node_client::types::{Block, Transaction},
    test_utils::{MockNode, new_mock_block, new_mock_transaction},
};

const START_TIME: i64 = 1_700_000_000;

fn txid(height: u64, i: usize) -> String {
    format!("tx-{}-{}", height, i)
}

fn new_chain(n: u64, txs_per_block: usize) -> (Vec<Block>, Vec<Transaction>) {
    let mut blocks = vec![];
    let mut transactions = vec![];
    for height in 0..n {
        let time = START_TIME + height as i64 * 120;
        let txids: Vec<String> = (0..txs_per_block).map(|i| txid(height, i)).collect();
        for id in &txids {
            transactions.push(new_mock_transaction(id, time, json!(1.5), json!(0.01)));
        }
        blocks.push(new_mock_block(height, time, 100.0 + height as f64, txids));
    }
    (blocks, transactions)
}

/// Collects formatted log lines for assertions.
#[derive(Clone, Default)]
struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn capture_logs() -> (LogBuffer, impl tracing::Subscriber + Send + Sync + 'static) {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer({
            let logs = logs.clone();
            move || logs.clone()
        })
        .with_ansi(false)
        .finish();
    (logs, subscriber)
}

fn assert_accounted(report: &FetchReport) {
    assert_eq!(
        report.fetched + report.missing + report.malformed + report.failed,
        report.requested,
        "{}",
        report
    );
}

#[test]
fn test_plan_heights() {
    assert_eq!(plan_heights(100, 3), vec![100, 99, 98]);
    assert_eq!(plan_heights(4, 5), vec![4, 3, 2, 1, 0]);
    assert!(plan_heights(7, 0).is_empty());
}

#[test]
fn test_plan_heights_clamps_to_chain_length() {
    let (logs, subscriber) = capture_logs();

    let heights = tracing::subscriber::with_default(subscriber, || plan_heights(4, 10));

    assert_eq!(heights, vec![4, 3, 2, 1, 0]);
    let output = logs.contents();
    assert!(output.contains("WARN"), "{}", output);
    assert!(
        output.contains("Requested 10 blocks, but only 5 are available. Adjusting to 5."),
        "{}",
        output
    );
}

#[test]
fn test_plan_heights_within_chain_does_not_warn() {
    let (logs, subscriber) = capture_logs();

    let heights = tracing::subscriber::with_default(subscriber, || plan_heights(4, 5));

    assert_eq!(heights.len(), 5);
    assert!(logs.contents().is_empty(), "{}", logs.contents());
}

#[tokio::test]
async fn test_fetch_latest_blocks() -> Result<()> {
    let (blocks, transactions) = new_chain(20, 2);
    let node = MockNode::new(blocks, transactions);

    let (fetched, report) =
        fetch_latest_blocks(node.clone(), 5, 3, CancellationToken::new()).await?;

    assert_eq!(fetched.keys().copied().collect::<Vec<_>>(), vec![15, 16, 17, 18, 19]);
    assert!(fetched.iter().all(|(height, block)| block.height == *height));
    assert_eq!(report.fetched, 5);
    assert!(!report.interrupted());
    assert_accounted(&report);
    Ok(())
}

#[tokio::test]
async fn test_fetch_latest_blocks_more_than_available() -> Result<()> {
    let (blocks, transactions) = new_chain(3, 1);
    let node = MockNode::new(blocks, transactions);

    let (fetched, report) =
        fetch_latest_blocks(node, 50, 4, CancellationToken::new()).await?;

    assert_eq!(fetched.len(), 3);
    assert_eq!(report.requested, 3);
    Ok(())
}

#[tokio::test]
async fn test_fetch_blocks_skips_failures() -> Result<()> {
    let (blocks, transactions) = new_chain(10, 1);
    let node = MockNode::new(blocks, transactions).with_malformed(vec![7]);

    let (fetched, report) =
        fetch_blocks(node, vec![9, 8, 7, 42], 2, CancellationToken::new()).await;

    assert_eq!(fetched.keys().copied().collect::<Vec<_>>(), vec![8, 9]);
    assert_eq!(report.requested, 4);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.malformed, 1);
    assert_eq!(report.failed, 1);
    assert!(!report.interrupted());
    assert_accounted(&report);
    Ok(())
}

#[tokio::test]
async fn test_fetch_transactions_soft_misses() -> Result<()> {
    let (blocks, mut transactions) = new_chain(4, 3);
    // drop one transaction from every block
    transactions.retain(|tx| !tx.txid.ends_with("-0"));
    let node = MockNode::new(blocks, transactions);

    let (fetched_blocks, _) =
        fetch_latest_blocks(node.clone(), 4, 2, CancellationToken::new()).await?;
    let (fetched, report) =
        fetch_transactions(node, &fetched_blocks, 2, CancellationToken::new()).await;

    let declared: u64 = fetched_blocks.values().map(|b| b.txcount).sum();
    assert_eq!(declared, 12);
    assert_eq!(fetched.len(), 8);
    assert!(fetched.len() as u64 <= declared);
    assert_eq!(report.missing, 4);
    assert_eq!(report.fetched, 8);
    assert_accounted(&report);

    for block in fetched_blocks.values() {
        let in_block = fetched
            .iter()
            .filter(|tx| block.txid.contains(&tx.txid))
            .count() as u64;
        assert!(in_block <= block.txcount);
    }
    Ok(())
}

#[tokio::test]
async fn test_duplicate_txids_fetched_once() -> Result<()> {
    let shared = "shared".to_string();
    let blocks = vec![
        new_mock_block(0, START_TIME, 1.0, vec![shared.clone(), "a".to_string()]),
        new_mock_block(1, START_TIME + 60, 1.0, vec![shared.clone()]),
    ];
    let transactions = vec![
        new_mock_transaction(&shared, START_TIME, json!(1), json!(0)),
        new_mock_transaction("a", START_TIME, json!(2), json!(0)),
    ];
    let node = MockNode::new(blocks.clone(), transactions);
    let blocks: BTreeMap<u64, Block> = blocks.into_iter().map(|b| (b.height, b)).collect();

    let txids = collect_txids(&blocks);
    assert_eq!(txids.len(), 2);

    let (fetched, report) =
        fetch_transactions(node.clone(), &blocks, 4, CancellationToken::new()).await;
    assert_eq!(fetched.len(), 2);
    assert_eq!(report.requested, 2);
    assert_eq!(node.calls(), 2);
    Ok(())
}

#[tokio::test]
async fn test_pool_bounds_concurrency() -> Result<()> {
    let (blocks, transactions) = new_chain(12, 0);
    let node = MockNode::new(blocks, transactions).with_delay(Duration::from_millis(20));

    let (fetched, _) = fetch_blocks(
        node.clone(),
        (0..12).collect(),
        3,
        CancellationToken::new(),
    )
    .await;

    assert_eq!(fetched.len(), 12);
    assert!(node.max_in_flight() <= 3, "max in flight {}", node.max_in_flight());
    assert_eq!(node.calls(), 24);
    Ok(())
}

#[tokio::test]
async fn test_cancelled_fetch_dispatches_nothing() -> Result<()> {
    let (blocks, transactions) = new_chain(5, 1);
    let node = MockNode::new(blocks, transactions);
    let cancel_token = CancellationToken::new();
    cancel_token.cancel();

    let (fetched, report) = fetch_blocks(node.clone(), vec![4, 3, 2], 2, cancel_token).await;

    assert!(fetched.is_empty());
    assert!(report.interrupted());
    assert_eq!(node.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn test_chain_height_retries_warmup() -> Result<()> {
    let (blocks, transactions) = new_chain(6, 0);
    let node = MockNode::new(blocks, transactions).with_warmup_failures(2);

    let height = get_chain_height(&node, CancellationToken::new()).await?;

    assert_eq!(height, 5);
    assert_eq!(node.calls(), 3);
    Ok(())
}

#[tokio::test]
async fn test_empty_chain_is_an_error() -> Result<()> {
    let node = MockNode::new(vec![], vec![]);
    let result = fetcher::fetch_latest_blocks(node, 10, 2, CancellationToken::new()).await;
    assert!(result.is_err());
    Ok(())
}
