use std::sync::Arc;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::ledger::keys::MatchKey;
use crate::ledger::{LedgerClient, ReceiptOracle, TxStatus};
use crate::matches::models::{MatchSettlement, RefundLeg};
use crate::matches::store::MatchStore;

/// Outcome of a reconciliation pass
#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub done: bool,
    pub reason: String,
}

impl Reconciliation {
    fn done(reason: impl Into<String>) -> Self {
        Self {
            done: true,
            reason: reason.into(),
        }
    }

    fn proceed(reason: impl Into<String>) -> Self {
        Self {
            done: false,
            reason: reason.into(),
        }
    }
}

/// The idempotence gate, consulted before any new settlement action.
///
/// Local transaction references are checked first: a pending transaction
/// means "do not retry", since a second settle/cancel while one may still
/// land is a double-spend. The ledger itself is the authoritative fallback for when
/// local bookkeeping is inconclusive (e.g. a crash before the reference was
/// persisted). Never issues a new ledger transaction; writes only to
/// finalize DB state once completion is proven.
pub struct Reconciler {
    store: Arc<dyn MatchStore>,
    ledger: Arc<dyn LedgerClient>,
    receipts: Arc<dyn ReceiptOracle>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn MatchStore>,
        ledger: Arc<dyn LedgerClient>,
        receipts: Arc<dyn ReceiptOracle>,
    ) -> Self {
        Self {
            store,
            ledger,
            receipts,
        }
    }

    pub async fn reconcile(&self, record: &MatchSettlement) -> AppResult<Reconciliation> {
        if record.is_terminal() {
            return Ok(Reconciliation::done("record already terminal"));
        }

        let key = MatchKey::from_encoded(&record.ledger_match_id);

        // Step 1: the payout transaction reference, if one was broadcast
        if let Some(tx_ref) = record.payout_tx_ref.as_deref() {
            match self.receipts.status_of(tx_ref).await {
                TxStatus::Success => {
                    let winner = match record.winner_address.clone() {
                        Some(w) => Some(w),
                        // Crash before the winner was persisted: the ledger
                        // recorded it at settle time.
                        None => self
                            .ledger
                            .get_match(&key)
                            .await?
                            .and_then(|lm| lm.winner),
                    };

                    if let Some(winner) = winner {
                        self.store.finalize_paid(record.id, &winner).await?;
                        info!("Match {} finalized as paid via payout tx {}", record.id, tx_ref);
                        return Ok(Reconciliation::done("payout transaction confirmed"));
                    }
                    warn!(
                        "Payout tx {} confirmed for match {} but no winner recorded anywhere",
                        tx_ref, record.id
                    );
                }
                TxStatus::Pending => {
                    return Ok(Reconciliation::done("payout transaction still in flight"));
                }
                // Reverted or dropped: the payout did not happen, fall through
                TxStatus::Reverted | TxStatus::NotFound => {}
            }
        }

        // Step 2: refund legs - same anti-double-spend rule per reference
        for leg in RefundLeg::all() {
            if let Some(tx_ref) = record.refund_tx_ref(leg) {
                if self.receipts.status_of(tx_ref).await == TxStatus::Pending {
                    return Ok(Reconciliation::done("refund transaction still in flight"));
                }
            }
        }

        // Step 3: the ledger is the durable source of truth; local state is a
        // cache/intent log. This repairs records after any crash.
        if let Some(ledger_match) = self.ledger.get_match(&key).await? {
            if ledger_match.is_closed() {
                return match ledger_match.winner {
                    Some(winner) => {
                        self.store.finalize_paid(record.id, &winner).await?;
                        info!("Match {} finalized as paid from ledger state", record.id);
                        Ok(Reconciliation::done("ledger reports match settled to winner"))
                    }
                    None => {
                        self.store.finalize_refunded(record.id).await?;
                        info!("Match {} finalized as refunded from ledger state", record.id);
                        Ok(Reconciliation::done("ledger reports match closed without winner"))
                    }
                };
            }
        }

        Ok(Reconciliation::proceed("settlement still required"))
    }
}
