use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::matches::models::{LifecycleStatus, MatchSettlement, PayoutStatus, SettlementKind};

/// Match outcome notification pushed by the hosting provider.
///
/// Unknown event types deserialize to `Unknown` and are acknowledged, never
/// rejected: the provider retries on non-2xx and we do not want retry storms
/// over event types we simply do not handle.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MatchEvent {
    MatchEnded {
        match_id: String,
        winner_team: Option<i16>,
    },
    MatchCancelled {
        match_id: String,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Serialize)]
pub struct WebhookAck {
    pub received: bool,
}

impl WebhookAck {
    pub fn ok() -> Self {
        Self { received: true }
    }
}

/// Settlement status readout
/// GET /api/v1/settlement/:match_id
#[derive(Debug, Serialize)]
pub struct SettlementStatusResponse {
    pub match_id: Uuid,
    pub ledger_match_id: String,
    pub lifecycle_status: LifecycleStatus,
    pub payout_status: PayoutStatus,
    pub settlement_kind: Option<SettlementKind>,
    pub winner_address: Option<String>,
    pub settlement_attempts: i32,
    pub payout_tx_ref: Option<String>,
    pub refund_tx_ref_one: Option<String>,
    pub refund_tx_ref_two: Option<String>,
    pub last_settlement_error: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl From<MatchSettlement> for SettlementStatusResponse {
    fn from(record: MatchSettlement) -> Self {
        Self {
            match_id: record.id,
            ledger_match_id: record.ledger_match_id,
            lifecycle_status: record.lifecycle_status,
            payout_status: record.payout_status,
            settlement_kind: record.settlement_kind,
            winner_address: record.winner_address,
            settlement_attempts: record.settlement_attempts,
            payout_tx_ref: record.payout_tx_ref,
            refund_tx_ref_one: record.refund_tx_ref_one,
            refund_tx_ref_two: record.refund_tx_ref_two,
            last_settlement_error: record.last_settlement_error,
            settled_at: record.settled_at,
        }
    }
}

/// Lobby formation request
/// POST /api/v1/matches
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMatchRequest {
    pub player_one: String,
    pub player_two: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub stake: Decimal,
    pub external_match_id: Option<String>,
    pub server_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreateMatchResponse {
    pub match_id: Uuid,
    pub ledger_match_id: String,
    pub create_tx_ref: String,
}
