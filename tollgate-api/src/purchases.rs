use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tollgate_engine::{PurchaseOutcome, RestoreError};

use crate::entitlement::EntitlementResponse;
use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub offer_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct RestoreResponse {
    pub is_subscribed: bool,
    /// Set when the platform re-sync failed; the refresh still ran
    pub sync_error: Option<String>,
    pub entitlement: EntitlementResponse,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/purchases", post(purchase))
        .route("/v1/restore", post(restore))
}

/// POST /v1/purchases
/// Returns the classified outcome; a completed purchase is already reflected
/// in the entitlement snapshot by the time this responds
async fn purchase(
    State(state): State<AppState>,
    Json(req): Json<PurchaseRequest>,
) -> Result<Json<PurchaseOutcome>, AppError> {
    let outcome = state.services.purchases.purchase(&req.offer_id).await?;
    Ok(Json(outcome))
}

/// POST /v1/restore
async fn restore(State(state): State<AppState>) -> (StatusCode, Json<RestoreResponse>) {
    match state.services.restores.restore().await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(RestoreResponse {
                is_subscribed: outcome.is_subscribed,
                sync_error: None,
                entitlement: outcome.entitlement.into(),
            }),
        ),
        Err(RestoreError::SyncFailed { reason, entitlement }) => (
            StatusCode::BAD_GATEWAY,
            Json(RestoreResponse {
                is_subscribed: entitlement.is_subscribed(),
                sync_error: Some(reason),
                entitlement: entitlement.into(),
            }),
        ),
    }
}
