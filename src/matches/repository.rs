use async_trait::async_trait;
use sqlx::types::BigDecimal;
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::ledger::keys::MatchKey;
use crate::matches::models::{
    MatchSettlement, NewMatch, PayoutStatus, RefundLeg, SettlementKind,
};
use crate::matches::store::MatchStore;

const MATCH_COLUMNS: &str = r#"
    id, ledger_match_id, player_one, player_two, stake,
    external_match_id, server_id,
    lifecycle_status, payout_status,
    winner_address, settlement_kind,
    lock_id, lock_acquired_at, settlement_attempts,
    payout_tx_ref, refund_tx_ref_one, refund_tx_ref_two,
    last_settlement_error, settled_at, created_at, updated_at
"#;

/// Postgres-backed match record store.
///
/// Coordination across executor processes relies on every mutating statement
/// carrying its own predicate: the row is claimed, advanced, or finalized in
/// the same statement that checks it is still eligible. There is no
/// read-then-write anywhere in this file.
pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn create(&self, new_match: NewMatch) -> AppResult<MatchSettlement> {
        let id = Uuid::new_v4();
        let key = MatchKey::from_match_id(id);
        let stake = BigDecimal::from_str(&new_match.stake.to_string())
            .map_err(|_| AppError::InvalidInput("Invalid stake amount".to_string()))?;

        let row = sqlx::query(&format!(
            r#"
            INSERT INTO match_settlements
                (id, ledger_match_id, player_one, player_two, stake,
                 external_match_id, server_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {MATCH_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(key.as_str())
        .bind(&new_match.player_one)
        .bind(&new_match.player_two)
        .bind(stake)
        .bind(&new_match.external_match_id)
        .bind(&new_match.server_id)
        .fetch_one(&self.pool)
        .await?;

        MatchSettlement::from_row(&row)
    }

    async fn get(&self, match_id: Uuid) -> AppResult<Option<MatchSettlement>> {
        let row = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM match_settlements WHERE id = $1"
        ))
        .bind(match_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(MatchSettlement::from_row).transpose()
    }

    async fn get_by_external_id(
        &self,
        external_id: &str,
    ) -> AppResult<Option<MatchSettlement>> {
        let row = sqlx::query(&format!(
            "SELECT {MATCH_COLUMNS} FROM match_settlements WHERE external_match_id = $1"
        ))
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(MatchSettlement::from_row).transpose()
    }

    async fn try_acquire(
        &self,
        match_id: Uuid,
        lock_id: Uuid,
        kind: SettlementKind,
        staleness: Duration,
        max_attempts: i32,
    ) -> AppResult<Option<MatchSettlement>> {
        let processing = match kind {
            SettlementKind::Payout => PayoutStatus::Processing,
            SettlementKind::Refund => PayoutStatus::RefundProcessing,
        };

        // The atomicity primitive: predicate and claim in one statement.
        // Returns the row only if the condition matched.
        let row = sqlx::query(&format!(
            r#"
            UPDATE match_settlements
            SET payout_status = $2,
                settlement_kind = $3,
                lock_id = $4,
                lock_acquired_at = NOW(),
                updated_at = NOW()
            WHERE id = $1
              AND payout_status NOT IN ('paid', 'refunded')
              AND settlement_attempts < $5
              AND (lock_id IS NULL
                   OR lock_acquired_at < NOW() - make_interval(secs => $6))
            RETURNING {MATCH_COLUMNS}
            "#
        ))
        .bind(match_id)
        .bind(processing)
        .bind(kind)
        .bind(lock_id)
        .bind(max_attempts)
        .bind(staleness.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(MatchSettlement::from_row).transpose()
    }

    async fn mark_intent(&self, match_id: Uuid, kind: SettlementKind) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE match_settlements
            SET settlement_kind = $2,
                last_settlement_error = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND payout_status NOT IN ('paid', 'refunded')
            "#,
        )
        .bind(match_id)
        .bind(kind)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_payout_tx(&self, match_id: Uuid, tx_ref: &str) -> AppResult<()> {
        // A confirmed transaction finalizes the record, so the terminal guard
        // doubles as "never overwrite a confirmed reference".
        sqlx::query(
            r#"
            UPDATE match_settlements
            SET payout_tx_ref = $2, updated_at = NOW()
            WHERE id = $1
              AND payout_status NOT IN ('paid', 'refunded')
            "#,
        )
        .bind(match_id)
        .bind(tx_ref)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn record_refund_tx(
        &self,
        match_id: Uuid,
        leg: RefundLeg,
        tx_ref: &str,
    ) -> AppResult<()> {
        let column = match leg {
            RefundLeg::One => "refund_tx_ref_one",
            RefundLeg::Two => "refund_tx_ref_two",
        };

        sqlx::query(&format!(
            r#"
            UPDATE match_settlements
            SET {column} = $2, updated_at = NOW()
            WHERE id = $1
              AND payout_status NOT IN ('paid', 'refunded')
            "#
        ))
        .bind(match_id)
        .bind(tx_ref)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn finalize_paid(&self, match_id: Uuid, winner: &str) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE match_settlements
            SET lifecycle_status = 'complete',
                payout_status = 'paid',
                winner_address = $2,
                settled_at = NOW(),
                lock_id = NULL,
                lock_acquired_at = NULL,
                last_settlement_error = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND payout_status NOT IN ('paid', 'refunded')
            "#,
        )
        .bind(match_id)
        .bind(winner)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn finalize_refunded(&self, match_id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE match_settlements
            SET lifecycle_status = 'cancelled',
                payout_status = 'refunded',
                settled_at = NOW(),
                lock_id = NULL,
                lock_acquired_at = NULL,
                last_settlement_error = NULL,
                updated_at = NOW()
            WHERE id = $1
              AND payout_status NOT IN ('paid', 'refunded')
            "#,
        )
        .bind(match_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn mark_failed(
        &self,
        match_id: Uuid,
        kind: SettlementKind,
        error: &str,
    ) -> AppResult<()> {
        let failed = match kind {
            SettlementKind::Payout => PayoutStatus::Failed,
            SettlementKind::Refund => PayoutStatus::RefundFailed,
        };

        sqlx::query(
            r#"
            UPDATE match_settlements
            SET payout_status = $2,
                last_settlement_error = $3,
                settlement_attempts = settlement_attempts + 1,
                updated_at = NOW()
            WHERE id = $1
              AND payout_status NOT IN ('paid', 'refunded')
            "#,
        )
        .bind(match_id)
        .bind(failed)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_stuck(
        &self,
        older_than: Duration,
        limit: i64,
    ) -> AppResult<Vec<MatchSettlement>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {MATCH_COLUMNS}
            FROM match_settlements
            WHERE payout_status NOT IN ('paid', 'refunded')
              AND lifecycle_status NOT IN ('complete', 'cancelled')
              AND created_at < NOW() - make_interval(secs => $1)
            ORDER BY created_at ASC
            LIMIT $2
            "#
        ))
        .bind(older_than.as_secs_f64())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(MatchSettlement::from_row).collect()
    }
}
