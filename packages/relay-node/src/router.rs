//! HTTP router setup.

use crate::handlers;
use crate::middleware::{assure_relay_ready, inject_request_id};
use crate::state::AppState;
use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

/// Create the application router.
///
/// `/setRelayHub` and `/audit` are mounted only when enabled in config.
pub fn create(state: Arc<AppState>) -> Router {
    let relay = Router::new()
        .route("/relay", post(handlers::relay))
        .route_layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state),
            assure_relay_ready,
        ));

    let mut router = Router::new()
        .merge(relay)
        .route("/getaddr", get(handlers::get_addr))
        .route("/metrics", get(handlers::metrics));

    if state.config.debug_api {
        router = router.route("/setRelayHub", post(handlers::set_relay_hub));
    }
    if state.config.audit_api {
        router = router.route("/audit", post(handlers::audit));
    }

    router
        .layer(axum::middleware::from_fn(inject_request_id))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static("*"),
        ))
        .with_state(state)
}
