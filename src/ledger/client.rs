use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::LedgerError;
use crate::ledger::keys::MatchKey;

/// Ledger-side view of an escrow match
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerMatch {
    pub players: [String; 2],
    #[serde(with = "rust_decimal::serde::float")]
    pub stake: Decimal,
    pub deposited: [bool; 2],
    /// False once the contract has settled or fully cancelled the match
    pub active: bool,
    /// Escrowed funds not yet paid out or moved to claimable balances
    #[serde(with = "rust_decimal::serde::float")]
    pub pot_remaining: Decimal,
    pub winner: Option<String>,
}

impl LedgerMatch {
    /// Fully and unambiguously closed: inactive with nothing left in the pot
    pub fn is_closed(&self) -> bool {
        !self.active && self.pot_remaining.is_zero()
    }
}

/// Thin client over the three settlement-relevant ledger operations plus the
/// reads reconciliation needs. The concrete ABI lives behind the gateway;
/// every transaction either fully applies or reverts.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn create_match(
        &self,
        key: &MatchKey,
        player_one: &str,
        player_two: &str,
        stake: Decimal,
    ) -> Result<String, LedgerError>;

    /// Pay the escrowed pot (minus fee) to the winner. Returns the
    /// transaction reference at broadcast time, before confirmation.
    async fn settle(&self, key: &MatchKey, winner: &str) -> Result<String, LedgerError>;

    /// Refund one player's deposit. Reverts with "nothing to refund" for a
    /// player who never deposited.
    async fn cancel(&self, key: &MatchKey, player: &str) -> Result<String, LedgerError>;

    async fn get_match(&self, key: &MatchKey) -> Result<Option<LedgerMatch>, LedgerError>;

    async fn claimable_balance_of(&self, address: &str) -> Result<Decimal, LedgerError>;

    /// Push-payment convenience: move a claimable balance into the owner's
    /// wallet. Funds stay pull-withdrawable if this is never called.
    async fn withdraw_to(&self, address: &str) -> Result<String, LedgerError>;
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct TxRefResult {
    tx_ref: String,
}

#[derive(Debug, Deserialize)]
struct BalanceResult {
    #[serde(with = "rust_decimal::serde::float")]
    balance: Decimal,
}

/// JSON-RPC client for the escrow ledger gateway
pub struct HttpLedgerClient {
    http: reqwest::Client,
    rpc_url: String,
}

impl HttpLedgerClient {
    pub fn new(rpc_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            rpc_url,
        }
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<Option<T>, LedgerError> {
        debug!("Ledger RPC call: {}", method);

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: RpcResponse<T> = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if let Some(err) = response.error {
            // Execution reverts come back as a distinct error class; anything
            // else is a transport/gateway failure.
            if err.code == REVERT_ERROR_CODE {
                return Err(LedgerError::Revert { reason: err.message });
            }
            return Err(LedgerError::Rpc(format!("{} ({})", err.message, err.code)));
        }

        Ok(response.result)
    }

    async fn call_tx(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<String, LedgerError> {
        let result: TxRefResult = self
            .call(method, params)
            .await?
            .ok_or_else(|| LedgerError::Rpc(format!("{}: empty result", method)))?;
        Ok(result.tx_ref)
    }
}

/// Gateway error code for contract execution reverts
const REVERT_ERROR_CODE: i64 = -32015;

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn create_match(
        &self,
        key: &MatchKey,
        player_one: &str,
        player_two: &str,
        stake: Decimal,
    ) -> Result<String, LedgerError> {
        self.call_tx(
            "escrow_createMatch",
            json!({
                "key": key.as_str(),
                "player_one": player_one,
                "player_two": player_two,
                "stake": stake.to_string(),
            }),
        )
        .await
    }

    async fn settle(&self, key: &MatchKey, winner: &str) -> Result<String, LedgerError> {
        self.call_tx(
            "escrow_settle",
            json!({ "key": key.as_str(), "winner": winner }),
        )
        .await
    }

    async fn cancel(&self, key: &MatchKey, player: &str) -> Result<String, LedgerError> {
        self.call_tx(
            "escrow_cancel",
            json!({ "key": key.as_str(), "player": player }),
        )
        .await
    }

    async fn get_match(&self, key: &MatchKey) -> Result<Option<LedgerMatch>, LedgerError> {
        self.call("escrow_getMatch", json!({ "key": key.as_str() }))
            .await
    }

    async fn claimable_balance_of(&self, address: &str) -> Result<Decimal, LedgerError> {
        let result: Option<BalanceResult> = self
            .call("escrow_claimableBalanceOf", json!({ "address": address }))
            .await?;
        Ok(result.map(|r| r.balance).unwrap_or(Decimal::ZERO))
    }

    async fn withdraw_to(&self, address: &str) -> Result<String, LedgerError> {
        self.call_tx("escrow_withdrawTo", json!({ "address": address }))
            .await
    }
}
