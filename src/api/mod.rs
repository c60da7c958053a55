//! HTTP API for the rewards engine
//!
//! Provides REST APIs for:
//! - User rewards data, awards, redemptions and referrals
//! - Admin settings, rule management and redemption review
//! - Security middleware (API keys, caller identity, headers)

pub mod admin;
pub mod error;
pub mod middleware;
pub mod rewards;

use axum::{Router, middleware as axum_middleware, routing::get};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::rewards::EloitsEngine;

pub use error::{ApiError, ApiResult};
pub use middleware::{
    Caller, SecurityMiddlewareConfig, SecurityState, auth_middleware, body_size_middleware,
    identity_middleware, require_admin, security_headers_middleware,
};
pub use rewards::RewardsApiState;

/// Full application router with the middleware stack applied
pub fn create_app(engine: Arc<EloitsEngine>, security: SecurityMiddlewareConfig) -> Router {
    let state = RewardsApiState { engine };
    let security_state = SecurityState::new(security);

    let admin = admin::create_router(state.clone())
        .route_layer(axum_middleware::from_fn(require_admin));
    let rewards = rewards::create_router(state).nest("/admin", admin);

    Router::new()
        .nest("/rewards", rewards)
        .route("/health", get(|| async { "OK" }))
        // Requests pass trace, headers, API key, body size, then identity
        .layer(axum_middleware::from_fn_with_state(
            security_state.clone(),
            identity_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            security_state.clone(),
            body_size_middleware,
        ))
        .layer(axum_middleware::from_fn_with_state(
            security_state,
            auth_middleware,
        ))
        .layer(axum_middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
}
