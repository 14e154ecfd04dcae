use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error as ThisError;

/// Node reports the transaction is neither indexed nor in the mempool.
pub const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;
/// Node is still loading its block index.
pub const RPC_IN_WARMUP: i32 = -28;
/// Printed by the CLI when the node is not (yet) listening.
pub const CONNECTION_FAILED: &str = "Could not connect to the server";

static ERROR_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"error code:\s*(-?\d+)").expect("error code pattern is valid"));

#[derive(Debug, Clone, PartialEq)]
pub struct NodeRpcErrorResponse {
    pub code: i32,
    pub message: String,
}

impl NodeRpcErrorResponse {
    /// Extracts the `error code: -N` / `error message:` pair the CLI prints on failure.
    pub fn parse(output: &str) -> Option<Self> {
        let captures = ERROR_CODE.captures(output)?;
        let code = captures.get(1)?.as_str().parse().ok()?;
        let message = match output.split_once("error message:") {
            Some((_, rest)) => rest.trim().to_string(),
            None => output[captures.get(0)?.end()..].trim().to_string(),
        };
        Some(Self { code, message })
    }
}

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("Unexpected error: {0}")]
    Unexpected(String),
    #[error("Failed to spawn {path}: {source}")]
    Spawn {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Node CLI exited with {code:?}: {output}")]
    Exit { code: Option<i32>, output: String },
    #[error("Node CLI returned no output")]
    EmptyOutput,
    #[error("Node RPC error (code {code}): {message}")]
    NodeRpc { code: i32, message: String },
    #[error("Malformed JSON response: {source}")]
    MalformedResponse {
        #[source]
        source: serde_json::Error,
        output: String,
    },
}

impl Error {
    /// Data the node does not have (unindexed transaction, nothing printed).
    pub fn is_soft_miss(&self) -> bool {
        matches!(
            self,
            Error::EmptyOutput
                | Error::NodeRpc {
                    code: RPC_INVALID_ADDRESS_OR_KEY,
                    ..
                }
        )
    }

    /// Node warming up or not reachable yet. Other exits (bad credentials,
    /// unknown command) fail the same way on every attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::NodeRpc { code, .. } => *code == RPC_IN_WARMUP,
            Error::Exit { output, .. } => output.contains(CONNECTION_FAILED),
            _ => false,
        }
    }
}
