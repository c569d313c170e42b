use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, U64, U256};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::types::Transfer;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http transport: {0}")]
    Http(#[from] reqwest::Error),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("malformed rpc response: {0}")]
    Decode(String),
    #[error("block {0} not available yet")]
    MissingBlock(u64),
}

/// Read access to the chain being watched.
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Latest block height known to the node.
    async fn current_height(&self) -> Result<u64, GatewayError>;

    /// Value transfers of the block at `height`, in transaction order.
    async fn fetch_block_transfers(&self, height: u64) -> Result<Vec<Transfer>, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcErrorObject>,
}

impl<T> RpcResponse<T> {
    fn into_result(self) -> Result<Option<T>, GatewayError> {
        match self.error {
            Some(err) => Err(GatewayError::Rpc {
                code: err.code,
                message: err.message,
            }),
            None => Ok(self.result),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcBlock {
    transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Deserialize)]
struct RpcTransaction {
    from: Address,
    #[serde(default)]
    to: Option<Address>,
    value: U256,
}

impl From<RpcTransaction> for Transfer {
    fn from(tx: RpcTransaction) -> Self {
        Transfer {
            from: tx.from,
            to: tx.to,
            value: tx.value,
        }
    }
}

/// `ChainGateway` over a plain Ethereum JSON-RPC HTTP endpoint.
pub struct JsonRpcGateway {
    client: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
}

impl JsonRpcGateway {
    pub fn new(url: Url, request_timeout: Duration) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            url,
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<Option<T>, GatewayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!("rpc {method} (id {id})");
        let response: RpcResponse<T> = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        response.into_result()
    }
}

fn block_tag(height: u64) -> String {
    format!("0x{height:x}")
}

#[async_trait]
impl ChainGateway for JsonRpcGateway {
    async fn current_height(&self) -> Result<u64, GatewayError> {
        let height: U64 = self
            .call("eth_blockNumber", json!([]))
            .await?
            .ok_or_else(|| GatewayError::Decode("eth_blockNumber returned null".into()))?;
        Ok(height.to::<u64>())
    }

    async fn fetch_block_transfers(&self, height: u64) -> Result<Vec<Transfer>, GatewayError> {
        let block: RpcBlock = self
            .call("eth_getBlockByNumber", json!([block_tag(height), true]))
            .await?
            .ok_or(GatewayError::MissingBlock(height))?;
        Ok(block.transactions.into_iter().map(Transfer::from).collect())
    }
}
