pub mod bot;
pub mod public;
pub mod webhooks;

use axum::Router;
use tower_http::trace::TraceLayer;

use crate::db::AppState;

/// The full application router.
pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        .merge(public::router(&state))
        .merge(webhooks::router());

    if state.telegram.is_some() {
        router = router.merge(bot::router());
    }

    router.layer(TraceLayer::new_for_http()).with_state(state)
}
