use std::{path::PathBuf, process::Stdio};

use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::config::NodeConfig;

use super::{
    error::{Error, NodeRpcErrorResponse},
    types::{Block, Transaction},
};

/// Thin wrapper over the node's command-line RPC binary.
#[derive(Clone, Debug)]
pub struct Client {
    cli_path: PathBuf,
    user: String,
    password: String,
}

impl Client {
    pub fn new(cli_path: impl Into<PathBuf>, user: String, password: String) -> Self {
        Client {
            cli_path: cli_path.into(),
            user,
            password,
        }
    }

    pub fn new_from_config(config: &NodeConfig) -> Self {
        Client::new(
            config.nexa_cli_path.to_owned(),
            config.nexa_rpc_user.to_owned(),
            config.nexa_rpc_password.to_owned(),
        )
    }

    /// Runs `<cli> -rpcuser=.. -rpcpassword=.. <args>` and returns trimmed stdout.
    pub async fn run_command(&self, args: &[&str]) -> Result<String, Error> {
        debug!("Running node command: {}", args.join(" "));
        let output = Command::new(&self.cli_path)
            .arg(format!("-rpcuser={}", self.user))
            .arg(format!("-rpcpassword={}", self.password))
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| Error::Spawn {
                path: self.cli_path.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();

        // stdout only carries error text when the call failed
        let detail = NodeRpcErrorResponse::parse(&stderr).or_else(|| {
            (!output.status.success())
                .then(|| NodeRpcErrorResponse::parse(&stdout))
                .flatten()
        });
        if let Some(detail) = detail {
            return Err(Error::NodeRpc {
                code: detail.code,
                message: detail.message,
            });
        }

        if !output.status.success() {
            return Err(Error::Exit {
                code: output.status.code(),
                output: if stderr.is_empty() { stdout } else { stderr },
            });
        }

        if stdout.is_empty() {
            return Err(Error::EmptyOutput);
        }

        Ok(stdout)
    }

    pub async fn call<T>(&self, args: &[&str]) -> Result<T, Error>
    where
        T: for<'de> Deserialize<'de>,
    {
        let output = self.run_command(args).await?;
        serde_json::from_str(&output).map_err(|source| Error::MalformedResponse { source, output })
    }

    pub async fn help(&self) -> Result<String, Error> {
        self.run_command(&["help"]).await
    }

    pub async fn get_block_count(&self) -> Result<u64, Error> {
        let output = self.run_command(&["getblockcount"]).await?;
        output
            .parse()
            .map_err(|_| Error::Unexpected(format!("Invalid block count: {}", output)))
    }

    pub async fn get_block_hash(&self, height: u64) -> Result<String, Error> {
        let height = height.to_string();
        self.run_command(&["getblockhash", height.as_str()]).await
    }

    pub async fn get_block(&self, hash: &str) -> Result<Block, Error> {
        self.call(&["getblock", hash, "1"]).await
    }

    pub async fn get_raw_transaction(&self, txid: &str) -> Result<Transaction, Error> {
        self.call(&["getrawtransaction", txid, "1"]).await
    }
}

pub trait NodeRpc: Send + Sync + Clone + 'static {
    fn get_block_count(&self) -> impl Future<Output = Result<u64, Error>> + Send;

    fn get_block_hash(&self, height: u64) -> impl Future<Output = Result<String, Error>> + Send;

    fn get_block(&self, hash: &str) -> impl Future<Output = Result<Block, Error>> + Send;

    fn get_raw_transaction(
        &self,
        txid: &str,
    ) -> impl Future<Output = Result<Transaction, Error>> + Send;
}

impl NodeRpc for Client {
    async fn get_block_count(&self) -> Result<u64, Error> {
        self.get_block_count().await
    }
    async fn get_block_hash(&self, height: u64) -> Result<String, Error> {
        self.get_block_hash(height).await
    }
    async fn get_block(&self, hash: &str) -> Result<Block, Error> {
        self.get_block(hash).await
    }
    async fn get_raw_transaction(&self, txid: &str) -> Result<Transaction, Error> {
        self.get_raw_transaction(txid).await
    }
}
