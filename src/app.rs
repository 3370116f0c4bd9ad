use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    handlers::{contact, create_escalation, escalation_status, healthcheck, subscribe},
    state::AppState,
};

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(healthcheck))
        .route("/api/waitlist", post(subscribe))
        // Alias kept for older form components and test scripts.
        .route("/api/subscribe", post(subscribe))
        .route("/api/contact", post(contact))
        .route(
            "/api/escalation",
            post(create_escalation).get(escalation_status),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS]),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
