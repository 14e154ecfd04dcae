//! Hourly aggregation over fetched blocks and transactions.
//!
//! Rows are projected from the persisted records, indexed by their `time`
//! field and sorted ascending. Aggregates cover every hour between the first
//! and the last row, so hours without activity still show up.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::node_client::types::{Block, Transaction};

const HOUR_SECS: i64 = 3600;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BlockRow {
    pub time: DateTime<Utc>,
    pub height: u64,
    pub size: u64,
    pub txcount: u64,
    pub mediantime: i64,
    pub difficulty: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRow {
    pub time: DateTime<Utc>,
    pub size: Option<u64>,
    pub locktime: Option<u64>,
    pub spends: Option<f64>,
    pub sends: Option<f64>,
    pub fee: Option<f64>,
    pub blockindex: Option<u64>,
    pub blocktime: Option<i64>,
    pub confirmations: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyVolume {
    pub hour: DateTime<Utc>,
    pub hourly_volume: f64,
    pub hourly_fees: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyCount {
    pub hour: DateTime<Utc>,
    pub transactions_per_hour: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourlyDifficulty {
    pub hour: DateTime<Utc>,
    pub closing_difficulty: Option<f64>,
}

/// One line of the combined hourly table.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HourlySummary {
    pub hourly_volume: Option<f64>,
    pub hourly_fees: Option<f64>,
    pub transactions_per_hour: Option<usize>,
    pub closing_difficulty: Option<f64>,
}

pub trait Timestamped {
    fn time(&self) -> DateTime<Utc>;
}

impl Timestamped for BlockRow {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

impl Timestamped for TransactionRow {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

pub fn to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Start of the hour containing `time`.
pub fn hour_floor(time: DateTime<Utc>) -> DateTime<Utc> {
    let secs = time.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(HOUR_SECS), 0).unwrap_or(time)
}

/// Numbers and numeric strings become `f64`; anything else is missing.
pub fn to_numeric(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (!number.is_nan()).then_some(number)
}

pub fn process_blocks(blocks: &[Block]) -> Vec<BlockRow> {
    let mut rows: Vec<BlockRow> = blocks
        .iter()
        .filter_map(|block| {
            let Some(time) = to_datetime(block.time) else {
                warn!("Block {} has an invalid time {}", block.height, block.time);
                return None;
            };
            Some(BlockRow {
                time,
                height: block.height,
                size: block.size,
                txcount: block.txcount,
                mediantime: block.mediantime,
                difficulty: block.difficulty,
            })
        })
        .collect();
    rows.sort_by_key(|row| (row.time, row.height));
    rows
}

pub fn process_transactions(transactions: &[Transaction]) -> Vec<TransactionRow> {
    let mut rows: Vec<TransactionRow> = transactions
        .iter()
        .filter_map(|tx| {
            let Some(time) = tx.time.and_then(to_datetime) else {
                warn!("Transaction {} has no usable time, dropping it", tx.txid);
                return None;
            };
            Some(TransactionRow {
                time,
                size: tx.size,
                locktime: tx.locktime,
                spends: to_numeric(tx.spends.as_ref()),
                sends: to_numeric(tx.sends.as_ref()),
                fee: to_numeric(tx.fee.as_ref()),
                blockindex: tx.blockindex,
                blocktime: tx.blocktime,
                confirmations: tx.confirmations,
            })
        })
        .collect();
    rows.sort_by_key(|row| row.time);
    rows
}

/// Splits time-sorted `rows` into consecutive one-hour buckets.
fn hourly_buckets<R: Timestamped>(rows: &[R]) -> Vec<(DateTime<Utc>, &[R])> {
    debug_assert!(rows.is_sorted_by_key(|r| r.time()));
    let (Some(first), Some(last)) = (rows.first(), rows.last()) else {
        return vec![];
    };
    let end = hour_floor(last.time());
    let mut hour = hour_floor(first.time());
    let mut rest = rows;
    let mut buckets = vec![];
    while hour <= end {
        let next = hour + TimeDelta::seconds(HOUR_SECS);
        let (bucket, tail) = rest.split_at(rest.partition_point(|r| r.time() < next));
        buckets.push((hour, bucket));
        rest = tail;
        hour = next;
    }
    buckets
}

pub fn hourly_volume_and_fees(rows: &[TransactionRow]) -> Vec<HourlyVolume> {
    hourly_buckets(rows)
        .into_iter()
        .map(|(hour, bucket)| HourlyVolume {
            hour,
            hourly_volume: bucket.iter().filter_map(|r| r.sends).sum(),
            hourly_fees: bucket.iter().filter_map(|r| r.fee).sum(),
        })
        .collect()
}

pub fn transactions_per_hour(rows: &[TransactionRow]) -> Vec<HourlyCount> {
    hourly_buckets(rows)
        .into_iter()
        .map(|(hour, bucket)| HourlyCount {
            hour,
            transactions_per_hour: bucket.len(),
        })
        .collect()
}

pub fn hourly_closing_difficulty(rows: &[BlockRow]) -> Vec<HourlyDifficulty> {
    hourly_buckets(rows)
        .into_iter()
        .map(|(hour, bucket)| HourlyDifficulty {
            hour,
            closing_difficulty: bucket.last().map(|r| r.difficulty),
        })
        .collect()
}

/// Outer join of the three hourly series on their hour.
pub fn summarize(
    volume: &[HourlyVolume],
    counts: &[HourlyCount],
    difficulty: &[HourlyDifficulty],
) -> BTreeMap<DateTime<Utc>, HourlySummary> {
    let mut table: BTreeMap<DateTime<Utc>, HourlySummary> = BTreeMap::new();
    for v in volume {
        let row = table.entry(v.hour).or_default();
        row.hourly_volume = Some(v.hourly_volume);
        row.hourly_fees = Some(v.hourly_fees);
    }
    for c in counts {
        table.entry(c.hour).or_default().transactions_per_hour = Some(c.transactions_per_hour);
    }
    for d in difficulty {
        table.entry(d.hour).or_default().closing_difficulty = d.closing_difficulty;
    }
    table
}
