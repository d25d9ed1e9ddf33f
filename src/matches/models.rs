use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::Type;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Coarse match lifecycle, mutated by the lobby layer up to Live and by the
/// settlement core only when finalizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "lifecycle_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStatus {
    Lobby,
    Depositing,
    Live,
    Complete,
    Cancelled,
}

impl LifecycleStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleStatus::Complete | LifecycleStatus::Cancelled)
    }
}

/// The settlement state machine owned by the core.
///
/// Valid transitions:
/// - Pending → Processing | RefundProcessing
/// - Processing → Paid | Failed
/// - RefundProcessing → Refunded | RefundFailed
/// - Failed → Processing (janitor retry)
/// - RefundFailed → RefundProcessing (janitor retry)
/// - Paid / Refunded are terminal: NO TRANSITIONS ALLOWED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Type)]
#[sqlx(type_name = "payout_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    Pending,
    Processing,
    Paid,
    Failed,
    RefundProcessing,
    Refunded,
    RefundFailed,
}

impl PayoutStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, PayoutStatus::Paid | PayoutStatus::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayoutStatus::Pending => "pending",
            PayoutStatus::Processing => "processing",
            PayoutStatus::Paid => "paid",
            PayoutStatus::Failed => "failed",
            PayoutStatus::RefundProcessing => "refund_processing",
            PayoutStatus::Refunded => "refunded",
            PayoutStatus::RefundFailed => "refund_failed",
        }
    }
}

impl fmt::Display for PayoutStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Settlement intent, persisted before the irreversible ledger action so a
/// crash mid-flight can be diagnosed without ambiguity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[sqlx(type_name = "settlement_kind", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SettlementKind {
    Payout,
    Refund,
}

/// The two refund transaction slots, one per player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundLeg {
    One,
    Two,
}

impl RefundLeg {
    pub fn all() -> [RefundLeg; 2] {
        [RefundLeg::One, RefundLeg::Two]
    }

    pub fn index(&self) -> usize {
        match self {
            RefundLeg::One => 0,
            RefundLeg::Two => 1,
        }
    }
}

/// The durable, shared mutable settlement record, one row per match.
///
/// All cross-process coordination is expressed as conditional updates
/// against this record; nothing here is trusted as an in-memory cache.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchSettlement {
    pub id: Uuid,
    /// Deterministic fixed-width escrow ledger key derived from `id`
    pub ledger_match_id: String,

    pub player_one: String,
    pub player_two: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub stake: Decimal,

    /// Correlation id assigned by the hosting provider
    pub external_match_id: Option<String>,
    /// Allocated game server, released after settlement confirms
    pub server_id: Option<String>,

    pub lifecycle_status: LifecycleStatus,
    pub payout_status: PayoutStatus,

    pub winner_address: Option<String>,
    pub settlement_kind: Option<SettlementKind>,

    pub lock_id: Option<Uuid>,
    pub lock_acquired_at: Option<DateTime<Utc>>,
    pub settlement_attempts: i32,

    pub payout_tx_ref: Option<String>,
    pub refund_tx_ref_one: Option<String>,
    pub refund_tx_ref_two: Option<String>,

    pub last_settlement_error: Option<String>,
    pub settled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MatchSettlement {
    pub fn is_terminal(&self) -> bool {
        self.payout_status.is_terminal()
    }

    pub fn is_participant(&self, address: &str) -> bool {
        self.player_one == address || self.player_two == address
    }

    pub fn refund_tx_ref(&self, leg: RefundLeg) -> Option<&str> {
        match leg {
            RefundLeg::One => self.refund_tx_ref_one.as_deref(),
            RefundLeg::Two => self.refund_tx_ref_two.as_deref(),
        }
    }

    pub fn player_for_leg(&self, leg: RefundLeg) -> &str {
        match leg {
            RefundLeg::One => &self.player_one,
            RefundLeg::Two => &self.player_two,
        }
    }

    /// Map the provider's winner team number to a player address
    pub fn winner_for_team(&self, team: i16) -> Option<&str> {
        match team {
            1 => Some(self.player_one.as_str()),
            2 => Some(self.player_two.as_str()),
            _ => None,
        }
    }

    /// Create from database row
    pub fn from_row(row: &sqlx::postgres::PgRow) -> AppResult<Self> {
        use sqlx::Row;

        let stake: sqlx::types::BigDecimal = row.try_get("stake")?;
        let stake = Decimal::from_str(&stake.to_string())
            .map_err(|_| AppError::Internal("Invalid stake in match record".to_string()))?;

        Ok(MatchSettlement {
            id: row.try_get("id")?,
            ledger_match_id: row.try_get("ledger_match_id")?,
            player_one: row.try_get("player_one")?,
            player_two: row.try_get("player_two")?,
            stake,
            external_match_id: row.try_get("external_match_id")?,
            server_id: row.try_get("server_id")?,
            lifecycle_status: row.try_get("lifecycle_status")?,
            payout_status: row.try_get("payout_status")?,
            winner_address: row.try_get("winner_address")?,
            settlement_kind: row.try_get("settlement_kind")?,
            lock_id: row.try_get("lock_id")?,
            lock_acquired_at: row.try_get("lock_acquired_at")?,
            settlement_attempts: row.try_get("settlement_attempts")?,
            payout_tx_ref: row.try_get("payout_tx_ref")?,
            refund_tx_ref_one: row.try_get("refund_tx_ref_one")?,
            refund_tx_ref_two: row.try_get("refund_tx_ref_two")?,
            last_settlement_error: row.try_get("last_settlement_error")?,
            settled_at: row.try_get("settled_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

/// Fields needed to create a settlement record at lobby formation
#[derive(Debug, Clone)]
pub struct NewMatch {
    pub player_one: String,
    pub player_two: String,
    pub stake: Decimal,
    pub external_match_id: Option<String>,
    pub server_id: Option<String>,
}
