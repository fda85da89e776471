use std::collections::BTreeSet;
use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_stream::{wrappers::WatchStream, Stream, StreamExt};
use tollgate_shared::{AccessStatus, EntitlementSource, EntitlementState};

use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct EntitlementResponse {
    pub is_subscribed: bool,
    pub status: AccessStatus,
    pub purchased_product_ids: BTreeSet<String>,
    pub source: Option<EntitlementSource>,
    pub revision: u64,
    pub evaluated_at: Option<DateTime<Utc>>,
}

impl From<EntitlementState> for EntitlementResponse {
    fn from(state: EntitlementState) -> Self {
        Self {
            is_subscribed: state.is_subscribed(),
            status: state.status,
            purchased_product_ids: state.purchased_product_ids,
            source: state.source,
            revision: state.revision,
            evaluated_at: state.evaluated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SetOverrideRequest {
    pub active: bool,
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/entitlement", get(current_entitlement))
        .route("/v1/entitlement/refresh", post(refresh_entitlement))
        .route("/v1/entitlement/override", put(set_override))
        .route("/v1/entitlement/stream", get(stream_entitlement))
}

/// GET /v1/entitlement
async fn current_entitlement(State(state): State<AppState>) -> Json<EntitlementResponse> {
    Json(state.services.engine.current().into())
}

/// POST /v1/entitlement/refresh
/// Waits for the recomputation; a ledger outage returns the unchanged snapshot
async fn refresh_entitlement(State(state): State<AppState>) -> Json<EntitlementResponse> {
    Json(state.services.engine.refresh().await.into())
}

/// PUT /v1/entitlement/override
/// Confirms (or withdraws) a web-originated subscription
async fn set_override(
    State(state): State<AppState>,
    Json(req): Json<SetOverrideRequest>,
) -> Json<EntitlementResponse> {
    tracing::info!(active = req.active, "External subscription override requested");
    Json(state.services.engine.set_override(req.active).await.into())
}

/// GET /v1/entitlement/stream
/// Server-sent events, one per published snapshot, starting with the current one
async fn stream_entitlement(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.services.engine.subscribe();

    let stream = WatchStream::new(rx).map(|snapshot| {
        let event = Event::default().event("entitlement");
        Ok(event
            .json_data(EntitlementResponse::from(snapshot))
            .unwrap_or_else(|e| {
                tracing::error!("Failed to encode entitlement event: {}", e);
                Event::default().event("error")
            }))
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
