use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Block as returned by `getblock <hash> 1`.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Block {
    pub height: u64,
    #[serde(default)]
    pub hash: String,
    pub size: u64,
    pub txcount: u64,
    /// Block timestamp, seconds since epoch
    pub time: i64,
    pub mediantime: i64,
    pub difficulty: f64,
    #[serde(default, alias = "tx")]
    pub txid: Vec<String>,
    /// Remaining node fields, kept so the persisted record is complete
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Transaction as returned by `getrawtransaction <txid> 1`.
///
/// Amounts stay raw JSON values; they are coerced to numbers when aggregated.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct Transaction {
    #[serde(default)]
    pub txid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locktime: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spends: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sends: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockindex: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocktime: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmations: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}
