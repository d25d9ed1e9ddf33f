use async_trait::async_trait;
use std::time::Duration;
use uuid::Uuid;

use crate::error::AppResult;
use crate::matches::models::{MatchSettlement, NewMatch, RefundLeg, SettlementKind};

/// Seam over the durable match record store.
///
/// Every mutation that coordinates concurrent executors must be a single
/// conditional write (read predicate + write in one statement). Callers
/// treat a `false`/`None` return as "another executor got there first",
/// never as an error.
#[async_trait]
pub trait MatchStore: Send + Sync {
    async fn create(&self, new_match: NewMatch) -> AppResult<MatchSettlement>;

    async fn get(&self, match_id: Uuid) -> AppResult<Option<MatchSettlement>>;

    async fn get_by_external_id(&self, external_id: &str)
        -> AppResult<Option<MatchSettlement>>;

    /// The optimistic-lock primitive: one conditional update that claims the
    /// record iff it is non-terminal, unlocked (or stale-locked), and under
    /// the attempt ceiling. Returns the claimed row, or None on contention.
    async fn try_acquire(
        &self,
        match_id: Uuid,
        lock_id: Uuid,
        kind: SettlementKind,
        staleness: Duration,
        max_attempts: i32,
    ) -> AppResult<Option<MatchSettlement>>;

    /// Persist settlement intent and clear the previous error
    async fn mark_intent(&self, match_id: Uuid, kind: SettlementKind) -> AppResult<()>;

    /// Persist the payout transaction reference the instant it is broadcast.
    /// Refused once the record is terminal: a confirmed reference is never
    /// overwritten.
    async fn record_payout_tx(&self, match_id: Uuid, tx_ref: &str) -> AppResult<()>;

    async fn record_refund_tx(
        &self,
        match_id: Uuid,
        leg: RefundLeg,
        tx_ref: &str,
    ) -> AppResult<()>;

    /// Terminal transition: Complete / Paid / settled_at, lock released
    async fn finalize_paid(&self, match_id: Uuid, winner: &str) -> AppResult<bool>;

    /// Terminal transition: Cancelled / Refunded / settled_at, lock released
    async fn finalize_refunded(&self, match_id: Uuid) -> AppResult<bool>;

    /// Record a failed attempt: status Failed/RefundFailed, error text,
    /// attempt counter bumped. The lock is left in place for staleness-based
    /// reclaim by the next janitor pass.
    async fn mark_failed(
        &self,
        match_id: Uuid,
        kind: SettlementKind,
        error: &str,
    ) -> AppResult<()>;

    /// Non-terminal records older than the grace window, candidates for the
    /// pull-path janitor.
    async fn list_stuck(&self, older_than: Duration, limit: i64)
        -> AppResult<Vec<MatchSettlement>>;
}
