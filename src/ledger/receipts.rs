use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

/// Classification of a broadcast transaction reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    /// Seen by the network but not mined yet
    Pending,
    /// Mined and applied
    Success,
    /// Mined but reverted
    Reverted,
    /// Unknown to the network: dropped, or not yet propagated
    NotFound,
}

/// Read-only receipt classifier.
///
/// Infallible by contract: a slow or failing RPC yields `NotFound` and the
/// caller decides whether to retry. No side effects.
#[async_trait]
pub trait ReceiptOracle: Send + Sync {
    async fn status_of(&self, tx_ref: &str) -> TxStatus;
}

#[derive(Debug, Deserialize)]
struct ReceiptResult {
    status: String,
}

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    result: Option<ReceiptResult>,
}

pub struct HttpReceiptOracle {
    http: reqwest::Client,
    rpc_url: String,
}

impl HttpReceiptOracle {
    pub fn new(rpc_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url,
        }
    }

    async fn fetch(&self, tx_ref: &str) -> Result<Option<ReceiptResult>, reqwest::Error> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "escrow_getReceipt",
            "params": { "tx_ref": tx_ref },
        });

        let envelope: RpcEnvelope = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        Ok(envelope.result)
    }
}

#[async_trait]
impl ReceiptOracle for HttpReceiptOracle {
    async fn status_of(&self, tx_ref: &str) -> TxStatus {
        match self.fetch(tx_ref).await {
            Ok(Some(receipt)) => match receipt.status.as_str() {
                "pending" => TxStatus::Pending,
                "success" => TxStatus::Success,
                "reverted" => TxStatus::Reverted,
                other => {
                    warn!("Unknown receipt status '{}' for tx {}", other, tx_ref);
                    TxStatus::NotFound
                }
            },
            Ok(None) => TxStatus::NotFound,
            Err(e) => {
                warn!("Receipt lookup failed for tx {}: {}", tx_ref, e);
                TxStatus::NotFound
            }
        }
    }
}
