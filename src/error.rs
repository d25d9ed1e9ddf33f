use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the entire application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Settlement error: {0}")]
    Settlement(#[from] SettlementError),

    #[error("Hosting provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unauthorized")]
    Unauthorized,
}

/// Errors from the escrow ledger gateway
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Ledger RPC error: {0}")]
    Rpc(String),

    #[error("Ledger transaction reverted: {reason}")]
    Revert { reason: String },
}

impl LedgerError {
    /// Reverts the escrow contract raises when a cancel targets a player
    /// who never deposited. Expected for one-sided abandonment.
    pub fn is_benign_for_refund(&self) -> bool {
        match self {
            LedgerError::Revert { reason } => {
                let reason = reason.to_lowercase();
                reason.contains("nothing to refund")
                    || reason.contains("not deposited")
                    || reason.contains("no deposit")
            }
            _ => false,
        }
    }

    /// Reverts raised when settle/cancel hits an already-finalized match.
    /// The ledger enforces idempotence; reconciliation resolves the record.
    pub fn is_already_finalized(&self) -> bool {
        match self {
            LedgerError::Revert { reason } => {
                let reason = reason.to_lowercase();
                reason.contains("already settled")
                    || reason.contains("already finalized")
                    || reason.contains("match not active")
            }
            _ => false,
        }
    }
}

/// Settlement pipeline errors
#[derive(Error, Debug)]
pub enum SettlementError {
    #[error("Winner {winner} is not a participant of match {match_id}")]
    WinnerNotParticipant { match_id: Uuid, winner: String },
}

/// Hosting-provider control-plane errors
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider request failed: {0}")]
    Http(String),

    #[error("Provider returned status {status}: {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        ProviderError::Http(error.to_string())
    }
}

impl From<reqwest::Error> for LedgerError {
    fn from(error: reqwest::Error) -> Self {
        LedgerError::Rpc(error.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal(format!("{:?}", error))
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        AppError::Internal(format!("Migration error: {:?}", error))
    }
}

/// API error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, message, details) = match self {
            AppError::NotFound(what) => (
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                format!("Not found: {}", what),
                None,
            ),
            AppError::InvalidInput(msg) => (
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                msg,
                None,
            ),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Missing or invalid credentials".to_string(),
                None,
            ),
            AppError::Settlement(SettlementError::WinnerNotParticipant { match_id, winner }) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "WINNER_NOT_PARTICIPANT",
                format!("Winner {} is not a participant of match {}", winner, match_id),
                Some(serde_json::json!({ "match_id": match_id })),
            ),
            AppError::Ledger(err) => (
                StatusCode::BAD_GATEWAY,
                "LEDGER_ERROR",
                format!("Ledger error: {}", err),
                None,
            ),
            AppError::Provider(err) => (
                StatusCode::BAD_GATEWAY,
                "PROVIDER_ERROR",
                format!("Provider error: {}", err),
                None,
            ),
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "DATABASE_ERROR",
                "A database error occurred".to_string(),
                None,
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
                None,
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            error_code: error_code.to_string(),
            details,
        });

        (status, body).into_response()
    }
}

/// Result type alias for the application
pub type AppResult<T> = Result<T, AppError>;
