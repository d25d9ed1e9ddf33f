//! In-memory doubles for the settlement pipeline's seams, used across the
//! settlement test modules.

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppResult, LedgerError, ProviderError};
use crate::ledger::keys::MatchKey;
use crate::ledger::{LedgerClient, LedgerMatch, ReceiptOracle, TxStatus};
use crate::matches::models::{
    LifecycleStatus, MatchSettlement, NewMatch, PayoutStatus, RefundLeg, SettlementKind,
};
use crate::matches::store::MatchStore;
use crate::provider::{HostingProvider, ProviderMatchStatus};

pub fn sample_match() -> MatchSettlement {
    let id = Uuid::new_v4();
    MatchSettlement {
        id,
        ledger_match_id: MatchKey::from_match_id(id).to_string(),
        player_one: "0xaaa".to_string(),
        player_two: "0xbbb".to_string(),
        stake: dec!(25.0),
        external_match_id: Some("ext-1".to_string()),
        server_id: Some("srv-1".to_string()),
        lifecycle_status: LifecycleStatus::Live,
        payout_status: PayoutStatus::Pending,
        winner_address: None,
        settlement_kind: None,
        lock_id: None,
        lock_acquired_at: None,
        settlement_attempts: 0,
        payout_tx_ref: None,
        refund_tx_ref_one: None,
        refund_tx_ref_two: None,
        last_settlement_error: None,
        settled_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// In-memory match store with the same conditional-update semantics as the
/// Postgres store: every mutation checks its predicate and applies under one
/// write-lock hold.
pub struct InMemoryMatchStore {
    records: RwLock<HashMap<Uuid, MatchSettlement>>,
}

impl InMemoryMatchStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }

    pub async fn insert(&self, record: MatchSettlement) {
        self.records.write().await.insert(record.id, record);
    }

    pub async fn get_record(&self, match_id: Uuid) -> MatchSettlement {
        self.records
            .read()
            .await
            .get(&match_id)
            .cloned()
            .expect("record not found")
    }
}

#[async_trait]
impl MatchStore for InMemoryMatchStore {
    async fn create(&self, new_match: NewMatch) -> AppResult<MatchSettlement> {
        let id = Uuid::new_v4();
        let record = MatchSettlement {
            id,
            ledger_match_id: MatchKey::from_match_id(id).to_string(),
            player_one: new_match.player_one,
            player_two: new_match.player_two,
            stake: new_match.stake,
            external_match_id: new_match.external_match_id,
            server_id: new_match.server_id,
            lifecycle_status: LifecycleStatus::Lobby,
            payout_status: PayoutStatus::Pending,
            winner_address: None,
            settlement_kind: None,
            lock_id: None,
            lock_acquired_at: None,
            settlement_attempts: 0,
            payout_tx_ref: None,
            refund_tx_ref_one: None,
            refund_tx_ref_two: None,
            last_settlement_error: None,
            settled_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        self.records.write().await.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, match_id: Uuid) -> AppResult<Option<MatchSettlement>> {
        Ok(self.records.read().await.get(&match_id).cloned())
    }

    async fn get_by_external_id(
        &self,
        external_id: &str,
    ) -> AppResult<Option<MatchSettlement>> {
        Ok(self
            .records
            .read()
            .await
            .values()
            .find(|r| r.external_match_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn try_acquire(
        &self,
        match_id: Uuid,
        lock_id: Uuid,
        kind: SettlementKind,
        staleness: Duration,
        max_attempts: i32,
    ) -> AppResult<Option<MatchSettlement>> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&match_id) else {
            return Ok(None);
        };

        if record.is_terminal() || record.settlement_attempts >= max_attempts {
            return Ok(None);
        }

        let lock_free = match (record.lock_id, record.lock_acquired_at) {
            (None, _) => true,
            (Some(_), Some(acquired_at)) => {
                let age = Utc::now() - acquired_at;
                age.to_std().unwrap_or_default() > staleness
            }
            (Some(_), None) => true,
        };
        if !lock_free {
            return Ok(None);
        }

        record.payout_status = match kind {
            SettlementKind::Payout => PayoutStatus::Processing,
            SettlementKind::Refund => PayoutStatus::RefundProcessing,
        };
        record.settlement_kind = Some(kind);
        record.lock_id = Some(lock_id);
        record.lock_acquired_at = Some(Utc::now());
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn mark_intent(&self, match_id: Uuid, kind: SettlementKind) -> AppResult<()> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&match_id) {
            if !record.is_terminal() {
                record.settlement_kind = Some(kind);
                record.last_settlement_error = None;
                record.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn record_payout_tx(&self, match_id: Uuid, tx_ref: &str) -> AppResult<()> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&match_id) {
            if !record.is_terminal() {
                record.payout_tx_ref = Some(tx_ref.to_string());
                record.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn record_refund_tx(
        &self,
        match_id: Uuid,
        leg: RefundLeg,
        tx_ref: &str,
    ) -> AppResult<()> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&match_id) {
            if !record.is_terminal() {
                match leg {
                    RefundLeg::One => record.refund_tx_ref_one = Some(tx_ref.to_string()),
                    RefundLeg::Two => record.refund_tx_ref_two = Some(tx_ref.to_string()),
                }
                record.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn finalize_paid(&self, match_id: Uuid, winner: &str) -> AppResult<bool> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&match_id) else {
            return Ok(false);
        };
        if record.is_terminal() {
            return Ok(false);
        }
        record.lifecycle_status = LifecycleStatus::Complete;
        record.payout_status = PayoutStatus::Paid;
        record.winner_address = Some(winner.to_string());
        record.settled_at = Some(Utc::now());
        record.lock_id = None;
        record.lock_acquired_at = None;
        record.last_settlement_error = None;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn finalize_refunded(&self, match_id: Uuid) -> AppResult<bool> {
        let mut records = self.records.write().await;
        let Some(record) = records.get_mut(&match_id) else {
            return Ok(false);
        };
        if record.is_terminal() {
            return Ok(false);
        }
        record.lifecycle_status = LifecycleStatus::Cancelled;
        record.payout_status = PayoutStatus::Refunded;
        record.settled_at = Some(Utc::now());
        record.lock_id = None;
        record.lock_acquired_at = None;
        record.last_settlement_error = None;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_failed(
        &self,
        match_id: Uuid,
        kind: SettlementKind,
        error: &str,
    ) -> AppResult<()> {
        let mut records = self.records.write().await;
        if let Some(record) = records.get_mut(&match_id) {
            if !record.is_terminal() {
                record.payout_status = match kind {
                    SettlementKind::Payout => PayoutStatus::Failed,
                    SettlementKind::Refund => PayoutStatus::RefundFailed,
                };
                record.last_settlement_error = Some(error.to_string());
                record.settlement_attempts += 1;
                record.updated_at = Utc::now();
            }
        }
        Ok(())
    }

    async fn list_stuck(
        &self,
        older_than: Duration,
        limit: i64,
    ) -> AppResult<Vec<MatchSettlement>> {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(older_than).unwrap_or(chrono::Duration::zero());
        let mut stuck: Vec<MatchSettlement> = self
            .records
            .read()
            .await
            .values()
            .filter(|r| {
                !r.payout_status.is_terminal()
                    && !r.lifecycle_status.is_terminal()
                    && r.created_at < cutoff
            })
            .cloned()
            .collect();
        stuck.sort_by_key(|r| r.created_at);
        stuck.truncate(limit as usize);
        Ok(stuck)
    }
}

/// Scriptable ledger double: records every settle/cancel/withdraw call and
/// hands out deterministic transaction references.
pub struct ScriptedLedger {
    matches: RwLock<HashMap<String, LedgerMatch>>,
    settle_calls: RwLock<Vec<String>>,
    cancel_calls: RwLock<Vec<String>>,
    withdraw_calls: RwLock<Vec<String>>,
    settle_revert: RwLock<Option<String>>,
    cancel_revert: RwLock<Option<(String, String)>>,
    cancel_fail_player: RwLock<Option<String>>,
    create_fail: RwLock<bool>,
}

impl ScriptedLedger {
    pub fn new() -> Self {
        Self {
            matches: RwLock::new(HashMap::new()),
            settle_calls: RwLock::new(Vec::new()),
            cancel_calls: RwLock::new(Vec::new()),
            withdraw_calls: RwLock::new(Vec::new()),
            settle_revert: RwLock::new(None),
            cancel_revert: RwLock::new(None),
            cancel_fail_player: RwLock::new(None),
            create_fail: RwLock::new(false),
        }
    }

    pub async fn set_match(&self, key: &str, ledger_match: LedgerMatch) {
        self.matches
            .write()
            .await
            .insert(key.to_string(), ledger_match);
    }

    pub async fn revert_settles(&self, reason: &str) {
        *self.settle_revert.write().await = Some(reason.to_string());
    }

    pub async fn fail_cancels_for(&self, player: &str) {
        *self.cancel_fail_player.write().await = Some(player.to_string());
    }

    pub async fn revert_cancels_for(&self, player: &str, reason: &str) {
        *self.cancel_revert.write().await = Some((player.to_string(), reason.to_string()));
    }

    pub async fn fail_creates(&self) {
        *self.create_fail.write().await = true;
    }

    pub async fn settle_calls(&self) -> usize {
        self.settle_calls.read().await.len()
    }

    pub async fn cancel_calls(&self) -> Vec<String> {
        self.cancel_calls.read().await.clone()
    }

    pub async fn withdraw_calls(&self) -> Vec<String> {
        self.withdraw_calls.read().await.clone()
    }
}

#[async_trait]
impl LedgerClient for ScriptedLedger {
    async fn create_match(
        &self,
        _key: &MatchKey,
        _player_one: &str,
        _player_two: &str,
        _stake: Decimal,
    ) -> Result<String, LedgerError> {
        if *self.create_fail.read().await {
            return Err(LedgerError::Rpc("simulated gateway failure".to_string()));
        }
        Ok("tx-create-1".to_string())
    }

    async fn settle(&self, _key: &MatchKey, winner: &str) -> Result<String, LedgerError> {
        if let Some(reason) = self.settle_revert.read().await.clone() {
            return Err(LedgerError::Revert { reason });
        }
        let mut calls = self.settle_calls.write().await;
        calls.push(winner.to_string());
        Ok(format!("tx-settle-{}", calls.len()))
    }

    async fn cancel(&self, _key: &MatchKey, player: &str) -> Result<String, LedgerError> {
        if let Some((target, reason)) = self.cancel_revert.read().await.clone() {
            if target == player {
                return Err(LedgerError::Revert { reason });
            }
        }
        if self.cancel_fail_player.read().await.as_deref() == Some(player) {
            return Err(LedgerError::Rpc("simulated gateway failure".to_string()));
        }
        let mut calls = self.cancel_calls.write().await;
        calls.push(player.to_string());
        Ok(format!("tx-cancel-{}", calls.len()))
    }

    async fn get_match(&self, key: &MatchKey) -> Result<Option<LedgerMatch>, LedgerError> {
        Ok(self.matches.read().await.get(key.as_str()).cloned())
    }

    async fn claimable_balance_of(&self, _address: &str) -> Result<Decimal, LedgerError> {
        // Winners always have something claimable in these scenarios
        Ok(dec!(47.5))
    }

    async fn withdraw_to(&self, address: &str) -> Result<String, LedgerError> {
        let mut calls = self.withdraw_calls.write().await;
        calls.push(address.to_string());
        Ok(format!("tx-withdraw-{}", calls.len()))
    }
}

/// Receipt oracle backed by a scripted status table; unknown refs are
/// NotFound, matching the real oracle's failure posture.
pub struct StaticReceipts {
    statuses: RwLock<HashMap<String, TxStatus>>,
}

impl StaticReceipts {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
        }
    }

    pub async fn set(&self, tx_ref: &str, status: TxStatus) {
        self.statuses
            .write()
            .await
            .insert(tx_ref.to_string(), status);
    }
}

#[async_trait]
impl ReceiptOracle for StaticReceipts {
    async fn status_of(&self, tx_ref: &str) -> TxStatus {
        self.statuses
            .read()
            .await
            .get(tx_ref)
            .copied()
            .unwrap_or(TxStatus::NotFound)
    }
}

/// Hosting provider double recording released servers
pub struct NoopProvider {
    statuses: RwLock<HashMap<String, ProviderMatchStatus>>,
    released: RwLock<Vec<String>>,
}

impl NoopProvider {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
            released: RwLock::new(Vec::new()),
        }
    }

    pub async fn set_status(&self, external_id: &str, status: ProviderMatchStatus) {
        self.statuses
            .write()
            .await
            .insert(external_id.to_string(), status);
    }

    pub async fn released(&self) -> Vec<String> {
        self.released.read().await.clone()
    }
}

#[async_trait]
impl HostingProvider for NoopProvider {
    async fn get_match_status(
        &self,
        external_id: &str,
    ) -> Result<ProviderMatchStatus, ProviderError> {
        Ok(self
            .statuses
            .read()
            .await
            .get(external_id)
            .cloned()
            .unwrap_or(ProviderMatchStatus::NotFound))
    }

    async fn send_server_command(
        &self,
        _server_id: &str,
        _command: &str,
    ) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn release_server(&self, server_id: &str) -> Result<(), ProviderError> {
        self.released.write().await.push(server_id.to_string());
        Ok(())
    }
}
