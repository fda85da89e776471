use axum::{http::Method, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod entitlement;
pub mod error;
pub mod offers;
pub mod purchases;
pub mod state;

pub use state::AppState;

pub fn app(state: AppState) -> Router {
    // UI gating clients run in webviews on other origins
    let cors = CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::USER_AGENT,
        ]);

    Router::new()
        .merge(entitlement::routes())
        .merge(offers::routes())
        .merge(purchases::routes())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
