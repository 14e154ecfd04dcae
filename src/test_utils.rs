use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use serde_json::{Map, Value, json};
use tokio::time::{Duration, sleep};
use tokio_util::sync::CancellationToken;

use crate::node_client::{
    Error, NodeRpc,
    error::{RPC_INVALID_ADDRESS_OR_KEY, RPC_IN_WARMUP},
    types::{Block, Transaction},
};

pub fn new_mock_block_hash(height: u64) -> String {
    format!("{:064x}", height + 1)
}

pub fn new_mock_block(height: u64, time: i64, difficulty: f64, txids: Vec<String>) -> Block {
    Block {
        height,
        hash: new_mock_block_hash(height),
        size: 250 * txids.len() as u64,
        txcount: txids.len() as u64,
        time,
        mediantime: time - 600,
        difficulty,
        txid: txids,
        extra: Map::new(),
    }
}

pub fn new_mock_transaction(txid: &str, time: i64, sends: Value, fee: Value) -> Transaction {
    Transaction {
        txid: txid.to_string(),
        size: Some(220),
        locktime: Some(0),
        spends: Some(json!(0)),
        sends: Some(sends),
        fee: Some(fee),
        blockindex: Some(1),
        blocktime: Some(time),
        time: Some(time),
        confirmations: Some(1),
        extra: Map::new(),
    }
}

/// In-memory node. Blocks listed in `malformed` answer with unparsable JSON,
/// txids missing from `transactions` answer with `error code: -5`.
/// `cancel_on_transaction` is tripped by the first transaction request.
#[derive(Clone, Default)]
pub struct MockNode {
    pub blocks: Arc<HashMap<u64, Block>>,
    pub transactions: Arc<HashMap<String, Transaction>>,
    pub malformed: Arc<Vec<u64>>,
    pub warmup_failures: Arc<AtomicUsize>,
    pub delay: Duration,
    pub calls: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
    pub max_in_flight: Arc<AtomicUsize>,
    pub cancel_on_transaction: Option<CancellationToken>,
}

impl MockNode {
    pub fn new(blocks: Vec<Block>, transactions: Vec<Transaction>) -> Self {
        Self {
            blocks: Arc::new(blocks.into_iter().map(|b| (b.height, b)).collect()),
            transactions: Arc::new(
                transactions
                    .into_iter()
                    .map(|tx| (tx.txid.clone(), tx))
                    .collect(),
            ),
            ..Default::default()
        }
    }

    pub fn with_malformed(mut self, heights: Vec<u64>) -> Self {
        self.malformed = Arc::new(heights);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_warmup_failures(self, n: usize) -> Self {
        self.warmup_failures.store(n, Ordering::SeqCst);
        self
    }

    pub fn with_cancel_on_transaction(mut self, cancel_token: CancellationToken) -> Self {
        self.cancel_on_transaction = Some(cancel_token);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn malformed_error() -> Error {
        let output = "{\"height\": ".to_string();
        match serde_json::from_str::<Value>(&output) {
            Err(source) => Error::MalformedResponse { source, output },
            Ok(_) => Error::Unexpected("mock JSON unexpectedly parsed".to_string()),
        }
    }
}

impl NodeRpc for MockNode {
    async fn get_block_count(&self) -> Result<u64, Error> {
        self.enter().await;
        let remaining = self.warmup_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.warmup_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::NodeRpc {
                code: RPC_IN_WARMUP,
                message: "Loading block index...".to_string(),
            });
        }
        self.blocks
            .keys()
            .max()
            .copied()
            .ok_or(Error::Unexpected("empty chain".to_string()))
    }

    async fn get_block_hash(&self, height: u64) -> Result<String, Error> {
        self.enter().await;
        if self.blocks.contains_key(&height) {
            Ok(new_mock_block_hash(height))
        } else {
            Err(Error::NodeRpc {
                code: -8,
                message: "Block height out of range".to_string(),
            })
        }
    }

    async fn get_block(&self, hash: &str) -> Result<Block, Error> {
        self.enter().await;
        let block = self
            .blocks
            .values()
            .find(|b| b.hash == hash)
            .ok_or(Error::NodeRpc {
                code: RPC_INVALID_ADDRESS_OR_KEY,
                message: "Block not found".to_string(),
            })?;
        if self.malformed.contains(&block.height) {
            return Err(Self::malformed_error());
        }
        Ok(block.clone())
    }

    async fn get_raw_transaction(&self, txid: &str) -> Result<Transaction, Error> {
        if let Some(cancel_token) = &self.cancel_on_transaction {
            cancel_token.cancel();
        }
        self.enter().await;
        self.transactions
            .get(txid)
            .cloned()
            .ok_or(Error::NodeRpc {
                code: RPC_INVALID_ADDRESS_OR_KEY,
                message: "No such mempool or blockchain transaction.".to_string(),
            })
    }
}
