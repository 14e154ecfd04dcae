use std::collections::BTreeMap;

use anyhow::Result;
use serde_json::json;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use nexa_stats::{
    node_client::types::{Block, Transaction},
    run,
    store::{self, DataFiles},
    test_utils::{MockNode, new_mock_block, new_mock_transaction},
};

// 2023-11-14 22:00:00 UTC
const HOUR: i64 = 1_699_999_200;

fn new_chain(n: u64) -> (Vec<Block>, Vec<Transaction>) {
    let mut blocks = vec![];
    let mut transactions = vec![];
    for height in 0..n {
        let time = HOUR + height as i64 * 900;
        let txids = vec![format!("tx-{}-a", height), format!("tx-{}-b", height)];
        for id in &txids {
            transactions.push(new_mock_transaction(id, time, json!(2.0), json!(0.5)));
        }
        blocks.push(new_mock_block(height, time, 10.0 + height as f64, txids));
    }
    (blocks, transactions)
}

fn write_previous_run(files: &DataFiles) -> Result<()> {
    let old = new_mock_block(99, HOUR - 7200, 1.0, vec!["old".to_string()]);
    store::save_blocks(&files.blocks, &BTreeMap::from([(99, old)]))?;
    store::save_transactions(
        &files.transactions,
        &[new_mock_transaction("old", HOUR - 7200, json!(1), json!(0))],
    )?;
    Ok(())
}

fn assert_previous_run_kept(files: &DataFiles) -> Result<()> {
    let blocks = store::load_blocks(&files.blocks)?;
    assert_eq!(blocks.iter().map(|b| b.height).collect::<Vec<_>>(), vec![99]);
    let transactions = store::load_transactions(&files.transactions)?;
    assert_eq!(
        transactions.iter().map(|tx| tx.txid.as_str()).collect::<Vec<_>>(),
        vec!["old"]
    );
    Ok(())
}

#[tokio::test]
async fn test_fetch_writes_both_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let files = DataFiles::in_dir(temp_dir.path());
    write_previous_run(&files)?;
    let (blocks, transactions) = new_chain(6);
    let node = MockNode::new(blocks, transactions);

    let (block_report, transaction_report) =
        run::fetch(node, &files, 4, 2, CancellationToken::new()).await?;

    assert_eq!(block_report.fetched, 4);
    assert_eq!(transaction_report.fetched, 8);
    let blocks = store::load_blocks(&files.blocks)?;
    assert_eq!(blocks.iter().map(|b| b.height).collect::<Vec<_>>(), vec![2, 3, 4, 5]);
    assert_eq!(store::load_transactions(&files.transactions)?.len(), 8);
    Ok(())
}

#[tokio::test]
async fn test_interrupted_transaction_stage_keeps_previous_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let files = DataFiles::in_dir(temp_dir.path());
    write_previous_run(&files)?;
    let (blocks, transactions) = new_chain(5);
    let cancel_token = CancellationToken::new();
    let node =
        MockNode::new(blocks, transactions).with_cancel_on_transaction(cancel_token.clone());

    let result = run::fetch(node, &files, 5, 1, cancel_token.clone()).await;

    assert!(cancel_token.is_cancelled());
    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("transactions"), "{:#}", err);
    assert_previous_run_kept(&files)
}

#[tokio::test]
async fn test_interrupted_block_stage_keeps_previous_files() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let files = DataFiles::in_dir(temp_dir.path());
    write_previous_run(&files)?;
    let (blocks, transactions) = new_chain(5);
    let node = MockNode::new(blocks, transactions);
    let cancel_token = CancellationToken::new();
    cancel_token.cancel();

    let err = run::fetch(node, &files, 5, 2, cancel_token).await.unwrap_err();

    assert!(format!("{:#}", err).contains("blocks"), "{:#}", err);
    assert_previous_run_kept(&files)
}

#[tokio::test]
async fn test_fetch_into_empty_directory() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let files = DataFiles::in_dir(&temp_dir.path().join("data"));
    let (blocks, transactions) = new_chain(2);

    run::fetch(
        MockNode::new(blocks, transactions),
        &files,
        2,
        2,
        CancellationToken::new(),
    )
    .await?;

    assert!(files.blocks.exists());
    assert!(files.transactions.exists());
    let leftovers: Vec<_> = std::fs::read_dir(temp_dir.path().join("data"))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}

#[test]
fn test_process_both_datasets() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let files = DataFiles::in_dir(temp_dir.path());
    let (blocks, transactions) = new_chain(5);
    store::save_blocks(
        &files.blocks,
        &blocks.into_iter().map(|b| (b.height, b)).collect::<BTreeMap<_, _>>(),
    )?;
    store::save_transactions(&files.transactions, &transactions)?;
    let chart_path = temp_dir.path().join("chart.svg");

    let table = run::process(&files, &chart_path)?;

    // blocks every 15 minutes from HOUR: 4 in the first hour, 1 in the next
    assert_eq!(table.len(), 2);
    let first = table.values().next().unwrap();
    assert_eq!(first.transactions_per_hour, Some(8));
    assert_eq!(first.hourly_volume, Some(16.0));
    assert_eq!(first.hourly_fees, Some(4.0));
    assert_eq!(first.closing_difficulty, Some(13.0));
    assert!(chart_path.exists());
    Ok(())
}

#[test]
fn test_process_skips_missing_transactions() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let files = DataFiles::in_dir(temp_dir.path());
    let (blocks, _) = new_chain(5);
    store::save_blocks(
        &files.blocks,
        &blocks.into_iter().map(|b| (b.height, b)).collect::<BTreeMap<_, _>>(),
    )?;
    let chart_path = temp_dir.path().join("chart.svg");

    let table = run::process(&files, &chart_path)?;

    assert_eq!(table.len(), 2);
    assert!(table.values().all(|row| row.transactions_per_hour.is_none()));
    assert!(table.values().all(|row| row.hourly_volume.is_none()));
    assert_eq!(
        table.values().map(|row| row.closing_difficulty).collect::<Vec<_>>(),
        vec![Some(13.0), Some(14.0)]
    );
    Ok(())
}

#[test]
fn test_process_skips_missing_blocks() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let files = DataFiles::in_dir(temp_dir.path());
    let (_, transactions) = new_chain(2);
    store::save_transactions(&files.transactions, &transactions)?;

    let table = run::process(&files, &temp_dir.path().join("chart.svg"))?;

    assert_eq!(table.len(), 1);
    let row = table.values().next().unwrap();
    assert_eq!(row.transactions_per_hour, Some(4));
    assert_eq!(row.closing_difficulty, None);
    Ok(())
}

#[test]
fn test_process_without_input_fails() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let files = DataFiles::in_dir(temp_dir.path());
    let chart_path = temp_dir.path().join("chart.svg");

    assert!(run::process(&files, &chart_path).is_err());
    assert!(!chart_path.exists());
    Ok(())
}

#[test]
fn test_process_with_nothing_to_plot_succeeds() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let files = DataFiles::in_dir(temp_dir.path());
    store::save_blocks(&files.blocks, &BTreeMap::new())?;
    let chart_path = temp_dir.path().join("chart.svg");

    let table = run::process(&files, &chart_path)?;

    assert!(table.is_empty());
    assert!(!chart_path.exists());
    Ok(())
}
