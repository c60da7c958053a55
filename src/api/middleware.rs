//! Request middleware for the rewards API
//!
//! Provides:
//! - API key authentication for service-to-service calls
//! - Caller identity from the upstream gateway (`x-user-id`, `x-user-role`)
//! - Admin gating
//! - Request size limits
//! - Security headers

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{debug, warn};

use crate::api::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const ADMIN_ROLE: &str = "admin";

/// Security configuration for middleware
#[derive(Debug, Clone)]
pub struct SecurityMiddlewareConfig {
    /// Enable API key authentication
    pub enable_auth: bool,
    pub api_keys: Vec<String>,
    /// Maximum request body size in bytes
    pub max_request_size: usize,
    /// Mask keys and ids in logs
    pub sanitize_logs: bool,
    /// Paths that skip authentication and identity
    pub public_paths: Vec<String>,
}

impl Default for SecurityMiddlewareConfig {
    fn default() -> Self {
        Self {
            enable_auth: true,
            api_keys: Vec::new(),
            max_request_size: 64 * 1024,
            sanitize_logs: true,
            public_paths: vec!["/health".to_string()],
        }
    }
}

#[derive(Clone)]
pub struct SecurityState {
    pub config: SecurityMiddlewareConfig,
}

impl SecurityState {
    pub fn new(config: SecurityMiddlewareConfig) -> Self {
        Self { config }
    }
}

/// Authenticated caller, as asserted by the gateway
#[derive(Debug, Clone, PartialEq)]
pub struct Caller {
    pub user_id: String,
    pub is_admin: bool,
}

impl Caller {
    /// Users may act on their own data; admins on anyone's
    pub fn ensure_can_access(&self, user_id: &str) -> Result<(), ApiError> {
        if self.is_admin || self.user_id == user_id {
            Ok(())
        } else {
            Err(ApiError::Forbidden("Access denied".to_string()))
        }
    }
}

/// Sanitize value for logging (mask sensitive data)
pub fn sanitize_for_log(value: &str) -> String {
    if value.len() <= 8 {
        return "*".repeat(value.len());
    }
    format!("{}...{}", &value[..4], &value[value.len() - 4..])
}

fn is_public_path(path: &str, public_paths: &[String]) -> bool {
    public_paths.iter().any(|p| path.starts_with(p))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// API key authentication
pub async fn auth_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let path = request.uri().path();

    if is_public_path(path, &state.config.public_paths) || !state.config.enable_auth {
        return Ok(next.run(request).await);
    }

    let api_key = headers
        .get("x-api-key")
        .or_else(|| headers.get("authorization"))
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim_start_matches("Bearer ").to_string());

    match api_key {
        Some(key) if state.config.api_keys.contains(&key) => {
            debug!("API key authenticated for path: {}", path);
            Ok(next.run(request).await)
        }
        Some(key) => {
            let shown = if state.config.sanitize_logs {
                sanitize_for_log(&key)
            } else {
                key
            };
            warn!(path = %path, key = %shown, "Invalid API key attempt");
            Err(StatusCode::UNAUTHORIZED)
        }
        None => {
            warn!("Missing API key for path: {}", path);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

/// Resolve the caller from gateway headers and attach it to the request
pub async fn identity_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Response {
    if is_public_path(request.uri().path(), &state.config.public_paths) {
        return next.run(request).await;
    }

    let Some(user_id) = header_str(&headers, USER_ID_HEADER) else {
        return ApiError::Unauthorized("No authenticated user".to_string()).into_response();
    };
    let is_admin = header_str(&headers, USER_ROLE_HEADER)
        .is_some_and(|role| role.eq_ignore_ascii_case(ADMIN_ROLE));

    request.extensions_mut().insert(Caller {
        user_id: user_id.to_string(),
        is_admin,
    });
    next.run(request).await
}

/// Reject non-admin callers; mount after [`identity_middleware`]
pub async fn require_admin(request: Request, next: Next) -> Response {
    let caller = request.extensions().get::<Caller>().cloned();
    match caller {
        Some(caller) if caller.is_admin => next.run(request).await,
        Some(caller) => {
            warn!(user_id = %caller.user_id, path = %request.uri().path(), "Admin access denied");
            ApiError::Forbidden("Admin access required".to_string()).into_response()
        }
        None => ApiError::Unauthorized("No authenticated user".to_string()).into_response(),
    }
}

/// Request body size validation
pub async fn body_size_middleware(
    State(state): State<SecurityState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let length = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok());
    if let Some(length) = length {
        if length > state.config.max_request_size {
            warn!(
                "Request body too large: {} bytes (max: {})",
                length, state.config.max_request_size
            );
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }
    }

    Ok(next.run(request).await)
}

pub async fn security_headers_middleware(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));
    headers.insert(
        "X-Content-Type-Options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert(
        "Strict-Transport-Security",
        HeaderValue::from_static("max-age=31536000; includeSubDomains"),
    );
    headers.insert(
        "Referrer-Policy",
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    // Balances change on every request
    headers.insert(
        "Cache-Control",
        HeaderValue::from_static("no-store, no-cache, must-revalidate"),
    );
    headers.remove("Server");

    response
}
