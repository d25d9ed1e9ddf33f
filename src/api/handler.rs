use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use std::sync::Arc;
use tokio::spawn;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::models::*;
use crate::{
    error::{AppError, AppResult},
    ledger::{keys::MatchKey, LedgerClient},
    matches::{models::NewMatch, store::MatchStore},
    provider::ProviderMatchStatus,
    settlement::{janitor, SettlementPipeline},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MatchStore>,
    pub ledger: Arc<dyn LedgerClient>,
    pub pipeline: Arc<SettlementPipeline>,
    pub webhook_secret: String,
}

/// Health check endpoint
/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "arena-backend",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Fails closed: a deployment without a configured secret rejects every
/// request instead of accepting any bearer token.
fn webhook_authorized(secret: &str, headers: &HeaderMap) -> bool {
    if secret.is_empty() {
        return false;
    }

    let Some(presented) = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
    else {
        return false;
    };

    constant_time_eq(presented.as_bytes(), secret.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Match outcome webhook from the hosting provider
/// POST /api/v1/webhook/match-event
///
/// Settlement runs off the request path; the provider only needs to know the
/// event was received. Unknown events and unmatched correlation ids still
/// acknowledge so the provider does not retry them forever.
pub async fn match_event_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(event): Json<MatchEvent>,
) -> AppResult<Json<WebhookAck>> {
    if !webhook_authorized(&state.webhook_secret, &headers) {
        return Err(AppError::Unauthorized);
    }

    let (external_id, status) = match event {
        MatchEvent::MatchEnded {
            match_id,
            winner_team,
        } => (match_id, ProviderMatchStatus::Ended { winner_team }),
        MatchEvent::MatchCancelled { match_id } => (match_id, ProviderMatchStatus::Cancelled),
        MatchEvent::Unknown => {
            info!("Ignoring unrecognized webhook event type");
            return Ok(Json(WebhookAck::ok()));
        }
    };

    let Some(record) = state.store.get_by_external_id(&external_id).await? else {
        warn!("Webhook for unknown external match id {}", external_id);
        return Ok(Json(WebhookAck::ok()));
    };

    let Some(decision) = janitor::decide(&record, &status) else {
        return Ok(Json(WebhookAck::ok()));
    };

    info!(
        "Webhook: match {} ({}) -> {:?}",
        record.id, external_id, decision
    );

    let pipeline = state.pipeline.clone();
    let match_id = record.id;
    spawn(async move {
        if let Err(err) = pipeline.run(match_id, decision).await {
            error!("Webhook-driven settlement of match {} failed: {}", match_id, err);
        }
    });

    Ok(Json(WebhookAck::ok()))
}

/// Settlement status readout
/// GET /api/v1/settlement/:match_id
pub async fn get_settlement_status(
    State(state): State<AppState>,
    Path(match_id): Path<Uuid>,
) -> AppResult<Json<SettlementStatusResponse>> {
    let record = state
        .store
        .get(match_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("match {}", match_id)))?;

    Ok(Json(record.into()))
}

/// Lobby formation: create the settlement record and its escrow ledger match
/// POST /api/v1/matches
pub async fn create_match(
    State(state): State<AppState>,
    Json(request): Json<CreateMatchRequest>,
) -> AppResult<Json<CreateMatchResponse>> {
    if request.player_one == request.player_two {
        return Err(AppError::InvalidInput(
            "A match needs two distinct players".to_string(),
        ));
    }
    if request.stake <= rust_decimal::Decimal::ZERO {
        return Err(AppError::InvalidInput(
            "Stake must be positive".to_string(),
        ));
    }

    let record = state
        .store
        .create(NewMatch {
            player_one: request.player_one,
            player_two: request.player_two,
            stake: request.stake,
            external_match_id: request.external_match_id,
            server_id: request.server_id,
        })
        .await?;

    let key = MatchKey::from_encoded(&record.ledger_match_id);
    let create_tx_ref = match state
        .ledger
        .create_match(&key, &record.player_one, &record.player_two, record.stake)
        .await
    {
        Ok(tx_ref) => tx_ref,
        Err(e) => {
            // No ledger match means nothing to settle; park the record
            // terminal so the janitor never retries it.
            warn!(
                "Ledger create for match {} failed, cancelling record: {}",
                record.id, e
            );
            state.store.finalize_refunded(record.id).await?;
            return Err(e.into());
        }
    };

    info!(
        "Match {} created with ledger key {} (tx {})",
        record.id, record.ledger_match_id, create_tx_ref
    );

    Ok(Json(CreateMatchResponse {
        match_id: record.id,
        ledger_match_id: record.ledger_match_id,
        create_tx_ref,
    }))
}
