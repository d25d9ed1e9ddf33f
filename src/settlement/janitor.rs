use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::matches::models::MatchSettlement;
use crate::matches::store::MatchStore;
use crate::provider::{HostingProvider, ProviderMatchStatus};
use crate::settlement::pipeline::{SettlementDecision, SettlementPipeline};

const SWEEP_BATCH_SIZE: i64 = 50;

/// Derive what settlement a stuck record needs from the provider's ground
/// truth. `None` means leave it alone for now.
pub fn decide(
    record: &MatchSettlement,
    status: &ProviderMatchStatus,
) -> Option<SettlementDecision> {
    match status {
        ProviderMatchStatus::Ended { winner_team } => {
            match winner_team.and_then(|team| record.winner_for_team(team)) {
                Some(winner) => Some(SettlementDecision::Payout {
                    winner: winner.to_string(),
                }),
                // Ended without a resolvable winner: draw or bad team id,
                // both stakes go back.
                None => Some(SettlementDecision::Refund),
            }
        }
        ProviderMatchStatus::Cancelled => Some(SettlementDecision::Refund),
        // The provider no longer knows the match; past the grace window the
        // only safe move is to return the stakes.
        ProviderMatchStatus::NotFound => Some(SettlementDecision::Refund),
        ProviderMatchStatus::InProgress => None,
    }
}

/// Pull-side ingestor: periodically sweeps non-terminal records older than
/// the grace window and drives each through the same pipeline the webhook
/// path uses. Missed or dropped webhooks converge here.
pub struct Janitor {
    store: Arc<dyn MatchStore>,
    provider: Arc<dyn HostingProvider>,
    pipeline: Arc<SettlementPipeline>,
    interval: Duration,
    grace: Duration,
}

impl Janitor {
    pub fn new(
        store: Arc<dyn MatchStore>,
        provider: Arc<dyn HostingProvider>,
        pipeline: Arc<SettlementPipeline>,
        interval: Duration,
        grace: Duration,
    ) -> Self {
        Self {
            store,
            provider,
            pipeline,
            interval,
            grace,
        }
    }

    pub async fn run(self) {
        info!(
            "Janitor started: sweeping every {:?}, grace window {:?}",
            self.interval, self.grace
        );
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(err) = self.sweep().await {
                error!("Janitor sweep failed: {}", err);
            }
        }
    }

    pub async fn sweep(&self) -> crate::error::AppResult<()> {
        let stuck = self.store.list_stuck(self.grace, SWEEP_BATCH_SIZE).await?;
        if stuck.is_empty() {
            return Ok(());
        }
        info!("Janitor found {} stuck match(es)", stuck.len());

        for record in stuck {
            let decision = match record.external_match_id.as_deref() {
                Some(external_id) => {
                    let status = match self.provider.get_match_status(external_id).await {
                        Ok(status) => status,
                        Err(err) => {
                            warn!(
                                "Provider lookup failed for match {} ({}): {}",
                                record.id, external_id, err
                            );
                            continue;
                        }
                    };
                    decide(&record, &status)
                }
                // Never dispatched to a server, nothing to wait for
                None => Some(SettlementDecision::Refund),
            };

            if let Some(decision) = decision {
                if let Err(err) = self.pipeline.run(record.id, decision).await {
                    error!("Janitor settlement of match {} failed: {}", record.id, err);
                }
            }
        }
        Ok(())
    }
}
