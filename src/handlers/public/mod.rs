mod charges;
mod vip;

pub use charges::*;
pub use vip::*;

use axum::{
    Json, Router, middleware,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;
use crate::middleware::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: &AppState) -> Router<AppState> {
    // Every path the old drafts used for charge creation stays reachable
    let create = Router::new()
        .route("/pix", post(create_pix))
        .route("/create-payment", post(create_pix))
        .route("/create-pix", post(create_pix))
        .route("/criar-pix", post(create_pix))
        .route_layer(middleware::from_fn_with_state(state.clone(), rate_limit));

    Router::new()
        .route("/health", get(health))
        .merge(create)
        .route("/charges/{id}", get(get_charge))
        .route("/charges/{id}/refresh", post(refresh_charge))
        .route("/check-vip", get(check_vip))
        .route("/vip/{subscriber}", get(get_vip))
        .route("/vip/{subscriber}/sync", post(sync_vip))
}
