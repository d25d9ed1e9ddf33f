use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::error::{AppResult, SettlementError};
use crate::ledger::keys::MatchKey;
use crate::ledger::{LedgerClient, ReceiptOracle, TxStatus};
use crate::matches::models::{MatchSettlement, RefundLeg, SettlementKind};
use crate::matches::store::MatchStore;
use crate::provider::HostingProvider;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    pub confirm_poll: Duration,
    pub confirm_budget: Duration,
}

/// Orchestrates the irreversible half of settlement: mark intent, broadcast
/// the ledger transaction, persist its reference immediately, await
/// confirmation, finalize.
///
/// The transaction reference is persisted at broadcast time, not after
/// confirmation: if the process dies in between, the next reconciliation
/// pass finds the pending/confirmed transaction instead of re-issuing it.
pub struct SettlementExecutor {
    store: Arc<dyn MatchStore>,
    ledger: Arc<dyn LedgerClient>,
    receipts: Arc<dyn ReceiptOracle>,
    provider: Arc<dyn HostingProvider>,
    config: ExecutorConfig,
}

impl SettlementExecutor {
    pub fn new(
        store: Arc<dyn MatchStore>,
        ledger: Arc<dyn LedgerClient>,
        receipts: Arc<dyn ReceiptOracle>,
        provider: Arc<dyn HostingProvider>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            store,
            ledger,
            receipts,
            provider,
            config,
        }
    }

    /// Pay the escrowed pot to `winner`.
    ///
    /// A winner outside the match's two players is a fatal logic error:
    /// surfaced immediately, never retried blindly, ledger untouched.
    pub async fn payout(&self, record: &MatchSettlement, winner: &str) -> AppResult<()> {
        if !record.is_participant(winner) {
            let err = SettlementError::WinnerNotParticipant {
                match_id: record.id,
                winner: winner.to_string(),
            };
            error!("{}", err);
            self.store
                .mark_failed(record.id, SettlementKind::Payout, &err.to_string())
                .await?;
            return Err(err.into());
        }

        self.store
            .mark_intent(record.id, SettlementKind::Payout)
            .await?;

        let key = MatchKey::from_encoded(&record.ledger_match_id);

        let tx_ref = match self.ledger.settle(&key, winner).await {
            Ok(tx_ref) => tx_ref,
            Err(e) if e.is_already_finalized() => {
                info!(
                    "Ledger reports match {} already finalized during settle, repairing local state",
                    record.id
                );
                return self.finalize_from_ledger(record).await;
            }
            Err(e) => {
                self.store
                    .mark_failed(
                        record.id,
                        SettlementKind::Payout,
                        &format!("settle broadcast failed: {}", e),
                    )
                    .await?;
                return Ok(());
            }
        };

        // Crash-safety line: reference on disk before we wait for anything
        self.store.record_payout_tx(record.id, &tx_ref).await?;
        info!("Payout tx {} broadcast for match {}", tx_ref, record.id);

        match self.await_confirmation(&tx_ref).await {
            TxStatus::Success => {
                self.store.finalize_paid(record.id, winner).await?;
                info!("Match {} paid out to {}", record.id, winner);
                self.release_server_best_effort(record).await;
                self.push_withdraw_best_effort(winner).await;
            }
            TxStatus::Reverted => {
                self.store
                    .mark_failed(
                        record.id,
                        SettlementKind::Payout,
                        &format!("payout tx {} reverted", tx_ref),
                    )
                    .await?;
            }
            TxStatus::Pending | TxStatus::NotFound => {
                // The reference is persisted; reconciliation finalizes once
                // (if) the transaction lands.
                self.store
                    .mark_failed(
                        record.id,
                        SettlementKind::Payout,
                        &format!("confirmation timed out for tx {}", tx_ref),
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Refund each deposited player independently, at most two legs.
    ///
    /// A "nothing to refund" revert for a player who never deposited is
    /// expected for one-sided abandonment and not a failure. Legs that
    /// already confirmed are never re-issued; the record finalizes only once
    /// every applicable leg is confirmed or legitimately skipped.
    pub async fn refund(&self, record: &MatchSettlement) -> AppResult<()> {
        self.store
            .mark_intent(record.id, SettlementKind::Refund)
            .await?;

        let key = MatchKey::from_encoded(&record.ledger_match_id);
        let ledger_match = self.ledger.get_match(&key).await?;

        let mut outstanding = false;

        for leg in RefundLeg::all() {
            let player = record.player_for_leg(leg);

            // Resume support: an already-confirmed leg is done, a pending
            // one must not be duplicated.
            if let Some(tx_ref) = record.refund_tx_ref(leg) {
                match self.receipts.status_of(tx_ref).await {
                    TxStatus::Success => continue,
                    TxStatus::Pending => {
                        outstanding = true;
                        continue;
                    }
                    TxStatus::Reverted | TxStatus::NotFound => {}
                }
            }

            // The ledger knows who actually deposited
            if let Some(lm) = &ledger_match {
                if !lm.deposited[leg.index()] {
                    continue;
                }
            }

            let tx_ref = match self.ledger.cancel(&key, player).await {
                Ok(tx_ref) => tx_ref,
                Err(e) if e.is_benign_for_refund() || e.is_already_finalized() => {
                    info!(
                        "Refund leg for {} on match {} skipped: {}",
                        player, record.id, e
                    );
                    continue;
                }
                Err(e) => {
                    self.store
                        .mark_failed(
                            record.id,
                            SettlementKind::Refund,
                            &format!("refund leg for {} failed: {}", player, e),
                        )
                        .await?;
                    return Ok(());
                }
            };

            self.store.record_refund_tx(record.id, leg, &tx_ref).await?;
            info!(
                "Refund tx {} broadcast for match {} player {}",
                tx_ref, record.id, player
            );

            match self.await_confirmation(&tx_ref).await {
                TxStatus::Success => {}
                TxStatus::Reverted => {
                    self.store
                        .mark_failed(
                            record.id,
                            SettlementKind::Refund,
                            &format!("refund tx {} reverted", tx_ref),
                        )
                        .await?;
                    return Ok(());
                }
                TxStatus::Pending | TxStatus::NotFound => {
                    outstanding = true;
                }
            }
        }

        if outstanding {
            // Left non-terminal on purpose: the in-flight leg is resolved by
            // the next reconciliation pass once its receipt lands.
            info!(
                "Match {} refund has legs still in flight, leaving non-terminal",
                record.id
            );
            return Ok(());
        }

        self.store.finalize_refunded(record.id).await?;
        info!("Match {} refunded", record.id);
        self.release_server_best_effort(record).await;
        Ok(())
    }

    /// Repair local state when the ledger reports settle/cancel against an
    /// already-finalized match (idempotent ledger, stale local record).
    async fn finalize_from_ledger(&self, record: &MatchSettlement) -> AppResult<()> {
        let key = MatchKey::from_encoded(&record.ledger_match_id);
        match self.ledger.get_match(&key).await? {
            Some(lm) if lm.is_closed() => {
                match lm.winner {
                    Some(winner) => {
                        self.store.finalize_paid(record.id, &winner).await?;
                        self.release_server_best_effort(record).await;
                    }
                    None => {
                        self.store.finalize_refunded(record.id).await?;
                        self.release_server_best_effort(record).await;
                    }
                }
                Ok(())
            }
            _ => {
                self.store
                    .mark_failed(
                        record.id,
                        record.settlement_kind.unwrap_or(SettlementKind::Payout),
                        "ledger reported already-finalized but state is inconclusive",
                    )
                    .await?;
                Ok(())
            }
        }
    }

    /// Poll the receipt oracle until the transaction resolves or the budget
    /// runs out. Returns the last observed status.
    async fn await_confirmation(&self, tx_ref: &str) -> TxStatus {
        let deadline = tokio::time::Instant::now() + self.config.confirm_budget;

        loop {
            let status = self.receipts.status_of(tx_ref).await;
            match status {
                TxStatus::Success | TxStatus::Reverted => return status,
                TxStatus::Pending | TxStatus::NotFound => {
                    if tokio::time::Instant::now() >= deadline {
                        return status;
                    }
                }
            }

            let jitter = rand::rng().random_range(0..250);
            tokio::time::sleep(self.config.confirm_poll + Duration::from_millis(jitter)).await;
        }
    }

    /// Server slots are freed only after settlement is durably confirmed,
    /// and a failure here never un-settles anything.
    async fn release_server_best_effort(&self, record: &MatchSettlement) {
        if let Some(server_id) = record.server_id.as_deref() {
            // Give the server a chance to kick players before teardown
            if let Err(e) = self
                .provider
                .send_server_command(server_id, "match_settled")
                .await
            {
                warn!("Settle notice to server {} failed: {}", server_id, e);
            }
            if let Err(e) = self.provider.release_server(server_id).await {
                warn!(
                    "Failed to release server {} for match {}: {}",
                    server_id, record.id, e
                );
            }
        }
    }

    /// Push-payment convenience; the winner keeps the pull-withdraw fallback
    /// against their claimable balance if this fails.
    async fn push_withdraw_best_effort(&self, winner: &str) {
        match self.ledger.claimable_balance_of(winner).await {
            Ok(balance) if balance.is_zero() => return,
            Ok(_) => {}
            Err(e) => {
                warn!("Claimable balance lookup for {} failed: {}", winner, e);
                return;
            }
        }

        match self.ledger.withdraw_to(winner).await {
            Ok(tx_ref) => info!("Push withdrawal {} issued for {}", tx_ref, winner),
            Err(e) => warn!("Push withdrawal for {} failed (pull fallback remains): {}", winner, e),
        }
    }
}
