use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

use crate::error::AppResult;
use crate::matches::models::{MatchSettlement, SettlementKind};
use crate::matches::store::MatchStore;

/// Optimistic, time-boxed exclusive acquisition of a match for settlement.
///
/// There is no mutex here: multiple executor processes coordinate purely
/// through the store's conditional-update primitive. A `None` result means
/// another executor holds the lock or the match is already terminal, and the
/// caller must skip, not fail.
pub struct LockManager {
    store: Arc<dyn MatchStore>,
    staleness: Duration,
    max_attempts: i32,
}

impl LockManager {
    pub fn new(store: Arc<dyn MatchStore>, staleness: Duration, max_attempts: i32) -> Self {
        Self {
            store,
            staleness,
            max_attempts,
        }
    }

    pub async fn acquire(
        &self,
        match_id: Uuid,
        kind: SettlementKind,
    ) -> AppResult<Option<MatchSettlement>> {
        let lock_id = Uuid::new_v4();

        let claimed = self
            .store
            .try_acquire(match_id, lock_id, kind, self.staleness, self.max_attempts)
            .await?;

        match &claimed {
            Some(record) => debug!(
                "Acquired settlement lock {} on match {} ({} attempts so far)",
                lock_id, match_id, record.settlement_attempts
            ),
            None => debug!(
                "Match {} locked elsewhere, terminal, or over the attempt ceiling - skipping",
                match_id
            ),
        }

        Ok(claimed)
    }
}
