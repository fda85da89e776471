use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tollgate_catalog::{price_label, trial_badge};
use tollgate_shared::{Offer, PeriodUnit};

use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct OfferResponse {
    pub id: String,
    pub price: Decimal,
    pub display_price: String,
    pub period: PeriodUnit,
    pub price_label: String,
    pub trial_badge: Option<String>,
}

impl From<&Offer> for OfferResponse {
    fn from(offer: &Offer) -> Self {
        Self {
            id: offer.id.clone(),
            price: offer.price,
            display_price: offer.display_price.clone(),
            period: offer.period,
            price_label: price_label(offer),
            trial_badge: trial_badge(offer),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CatalogResponse {
    pub loading: bool,
    pub offers: Vec<OfferResponse>,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/offers", get(list_offers))
        .route("/v1/offers/refresh", post(refresh_offers))
}

/// GET /v1/offers
/// Cached catalog, cheapest first
async fn list_offers(State(state): State<AppState>) -> Json<CatalogResponse> {
    Json(catalog_response(&state))
}

/// POST /v1/offers/refresh
/// A failed fetch leaves the cached catalog in place
async fn refresh_offers(State(state): State<AppState>) -> Json<CatalogResponse> {
    state.services.refresh_catalog().await;
    Json(catalog_response(&state))
}

fn catalog_response(state: &AppState) -> CatalogResponse {
    let catalog = &state.services.catalog;
    CatalogResponse {
        loading: catalog.is_loading(),
        offers: catalog.offers().iter().map(OfferResponse::from).collect(),
    }
}
