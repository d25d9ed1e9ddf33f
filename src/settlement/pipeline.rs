use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::AppResult;
use crate::matches::models::SettlementKind;
use crate::matches::store::MatchStore;
use crate::settlement::executor::SettlementExecutor;
use crate::settlement::lock::LockManager;
use crate::settlement::reconciler::Reconciler;

/// What the observed outcome requires of settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettlementDecision {
    Payout { winner: String },
    Refund,
}

impl SettlementDecision {
    pub fn kind(&self) -> SettlementKind {
        match self {
            SettlementDecision::Payout { .. } => SettlementKind::Payout,
            SettlementDecision::Refund => SettlementKind::Refund,
        }
    }
}

/// The single entry point both ingest paths drive:
/// Reconciler (idempotence gate) → Lock Manager (exclusive claim) →
/// Settlement Executor (the irreversible action).
pub struct SettlementPipeline {
    store: Arc<dyn MatchStore>,
    reconciler: Reconciler,
    locks: LockManager,
    executor: SettlementExecutor,
}

impl SettlementPipeline {
    pub fn new(
        store: Arc<dyn MatchStore>,
        reconciler: Reconciler,
        locks: LockManager,
        executor: SettlementExecutor,
    ) -> Self {
        Self {
            store,
            reconciler,
            locks,
            executor,
        }
    }

    pub async fn run(&self, match_id: Uuid, decision: SettlementDecision) -> AppResult<()> {
        let Some(record) = self.store.get(match_id).await? else {
            warn!("Settlement requested for unknown match {}", match_id);
            return Ok(());
        };

        let reconciliation = self.reconciler.reconcile(&record).await?;
        if reconciliation.done {
            info!(
                "Match {} needs no settlement: {}",
                match_id, reconciliation.reason
            );
            return Ok(());
        }

        let Some(claimed) = self.locks.acquire(match_id, decision.kind()).await? else {
            // Another executor holds the claim; skip, not an error
            return Ok(());
        };

        match decision {
            SettlementDecision::Payout { winner } => {
                self.executor.payout(&claimed, &winner).await
            }
            SettlementDecision::Refund => self.executor.refund(&claimed).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{LedgerMatch, TxStatus};
    use crate::matches::models::PayoutStatus;
    use crate::settlement::executor::ExecutorConfig;
    use crate::settlement::mock::{
        sample_match, InMemoryMatchStore, NoopProvider, ScriptedLedger, StaticReceipts,
    };
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Harness {
        store: Arc<InMemoryMatchStore>,
        ledger: Arc<ScriptedLedger>,
        receipts: Arc<StaticReceipts>,
        pipeline: SettlementPipeline,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryMatchStore::new());
        let ledger = Arc::new(ScriptedLedger::new());
        let receipts = Arc::new(StaticReceipts::new());
        let provider = Arc::new(NoopProvider::new());

        let reconciler = Reconciler::new(store.clone(), ledger.clone(), receipts.clone());
        let locks = LockManager::new(store.clone(), Duration::from_secs(120), 10);
        let executor = SettlementExecutor::new(
            store.clone(),
            ledger.clone(),
            receipts.clone(),
            provider,
            ExecutorConfig {
                confirm_poll: Duration::from_millis(1),
                confirm_budget: Duration::from_millis(20),
            },
        );

        let pipeline = SettlementPipeline::new(store.clone(), reconciler, locks, executor);
        Harness {
            store,
            ledger,
            receipts,
            pipeline,
        }
    }

    fn open_ledger_match(record: &crate::matches::models::MatchSettlement) -> LedgerMatch {
        LedgerMatch {
            players: [record.player_one.clone(), record.player_two.clone()],
            stake: dec!(25.0),
            deposited: [true, true],
            active: true,
            pot_remaining: dec!(50.0),
            winner: None,
        }
    }

    #[tokio::test]
    async fn test_duplicate_win_event_settles_exactly_once() {
        let h = harness();
        let record = sample_match();
        h.ledger
            .set_match(&record.ledger_match_id, open_ledger_match(&record))
            .await;
        h.receipts.set("tx-settle-1", TxStatus::Success).await;
        h.store.insert(record.clone()).await;

        let decision = SettlementDecision::Payout {
            winner: record.player_one.clone(),
        };

        // "A wins" arrives twice within the staleness window
        h.pipeline.run(record.id, decision.clone()).await.unwrap();
        h.pipeline.run(record.id, decision).await.unwrap();

        assert_eq!(h.ledger.settle_calls().await, 1);
        let stored = h.store.get_record(record.id).await;
        assert_eq!(stored.payout_status, PayoutStatus::Paid);
    }

    #[tokio::test]
    async fn test_crash_then_resume_does_not_reissue_pending_tx() {
        let h = harness();
        let mut record = sample_match();
        // Simulates a crash after broadcast: reference persisted, record
        // never finalized, lock long stale.
        record.payout_tx_ref = Some("tx-orphan".to_string());
        record.winner_address = None;
        h.receipts.set("tx-orphan", TxStatus::Pending).await;
        h.ledger
            .set_match(&record.ledger_match_id, open_ledger_match(&record))
            .await;
        h.store.insert(record.clone()).await;

        let decision = SettlementDecision::Payout {
            winner: record.player_one.clone(),
        };

        // While the orphan is pending, no new settle may be issued
        h.pipeline.run(record.id, decision.clone()).await.unwrap();
        assert_eq!(h.ledger.settle_calls().await, 0);
        assert_eq!(
            h.store.get_record(record.id).await.payout_status,
            PayoutStatus::Pending
        );

        // The orphan lands; ledger now reports the winner
        h.receipts.set("tx-orphan", TxStatus::Success).await;
        let mut lm = open_ledger_match(&record);
        lm.active = false;
        lm.pot_remaining = dec!(0);
        lm.winner = Some(record.player_one.clone());
        h.ledger.set_match(&record.ledger_match_id, lm).await;

        h.pipeline.run(record.id, decision).await.unwrap();
        assert_eq!(h.ledger.settle_calls().await, 0);
        let stored = h.store.get_record(record.id).await;
        assert_eq!(stored.payout_status, PayoutStatus::Paid);
        assert_eq!(stored.winner_address, Some(record.player_one.clone()));
    }

    #[tokio::test]
    async fn test_cancel_event_one_sided_deposit_refunds_once() {
        let h = harness();
        let record = sample_match();
        let mut lm = open_ledger_match(&record);
        lm.deposited = [true, false];
        h.ledger.set_match(&record.ledger_match_id, lm).await;
        h.receipts.set("tx-cancel-1", TxStatus::Success).await;
        h.store.insert(record.clone()).await;

        h.pipeline
            .run(record.id, SettlementDecision::Refund)
            .await
            .unwrap();
        h.pipeline
            .run(record.id, SettlementDecision::Refund)
            .await
            .unwrap();

        assert_eq!(h.ledger.cancel_calls().await, vec!["0xaaa".to_string()]);
        assert_eq!(
            h.store.get_record(record.id).await.payout_status,
            PayoutStatus::Refunded
        );
    }

    #[tokio::test]
    async fn test_unknown_match_is_acknowledged_quietly() {
        let h = harness();
        h.pipeline
            .run(Uuid::new_v4(), SettlementDecision::Refund)
            .await
            .unwrap();
        assert_eq!(h.ledger.cancel_calls().await.len(), 0);
    }
}
