use std::{
    collections::BTreeMap,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Serialize, de::DeserializeOwned};
use tracing::info;

use crate::node_client::types::{Block, Transaction};

pub const BLOCKS_FILE: &str = "nexa_last_blocks.json";
pub const TRANSACTIONS_FILE: &str = "nexa_transactions.json";

/// The pair of files a fetch run produces and a process run consumes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFiles {
    pub blocks: PathBuf,
    pub transactions: PathBuf,
}

impl DataFiles {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            blocks: dir.join(BLOCKS_FILE),
            transactions: dir.join(TRANSACTIONS_FILE),
        }
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Serializes into a sibling `.tmp` file, then renames it over `path`.
fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let tmp = tmp_path(path);
    let file = File::create(&tmp).with_context(|| format!("Failed to create {}", tmp.display()))?;
    let mut writer = BufWriter::new(file);
    if pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    } else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writer.flush()?;
    drop(writer);
    fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {} to {}", tmp.display(), path.display()))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let value = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))?;
    info!("Successfully read JSON file: {}", path.display());
    Ok(value)
}

/// Writes blocks as a JSON array ordered by height.
pub fn save_blocks(path: &Path, blocks: &BTreeMap<u64, Block>) -> Result<()> {
    let records: Vec<&Block> = blocks.values().collect();
    write_json(path, &records, false)?;
    info!("Block data saved to {}", path.display());
    Ok(())
}

pub fn save_transactions(path: &Path, transactions: &[Transaction]) -> Result<()> {
    write_json(path, transactions, true)?;
    info!("Transaction data saved to {}", path.display());
    Ok(())
}

pub fn load_blocks(path: &Path) -> Result<Vec<Block>> {
    read_json(path)
}

pub fn load_transactions(path: &Path) -> Result<Vec<Transaction>> {
    read_json(path)
}
