//!
//! headgate HTTP pipeline
//! ----------------------
//! Axum front end for the identity subsystem. A single middleware layer
//! extracts the trusted proxy header and the session cookie, runs the
//! resolver, and attaches the outcome to the request scope.
//!
//! Responsibilities:
//! - Trusted-header extraction (header name is configuration, agreed with
//!   the upstream proxy).
//! - Session cookie plumbing: the session cookie is emitted if and only if
//!   the store actually created an entry for this request, and cleared when
//!   the presented token was invalidated with nothing replacing it.
//! - Demo routes: `/` (open greeting), `/whoami` (requires a context),
//!   `/logout` (idempotent invalidation).

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::json;
use tracing::{debug, error, info};

use crate::error::AppError;
use crate::identity::{
    IdentityResolver, RequestContext, SessionCreationPolicy, SessionStore, StaticDirectory,
    UserDirectory,
};

const SESSION_COOKIE: &str = "headgate_session";

/// Process-wide configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub http_port: u16,
    /// Name of the header the verifying proxy uses to forward the caller's
    /// identity. Only meaningful inside the proxy-protected boundary.
    pub trusted_header: String,
    pub session_policy: SessionCreationPolicy,
    /// Session entry lifetime in seconds; 0 disables expiry.
    pub session_ttl_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: 7878,
            trusted_header: "x-auth-user".to_string(),
            session_policy: SessionCreationPolicy::Never,
            session_ttl_secs: 3600,
        }
    }
}

impl ServerConfig {
    /// Environment-driven configuration with fail-closed defaults: an
    /// unset or unparseable policy falls back to `Never`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let http_port = std::env::var("HEADGATE_HTTP_PORT")
            .ok()
            .and_then(|s| s.parse::<u16>().ok())
            .unwrap_or(defaults.http_port);
        let trusted_header = std::env::var("HEADGATE_TRUSTED_HEADER")
            .unwrap_or(defaults.trusted_header)
            .to_ascii_lowercase();
        let session_policy = std::env::var("HEADGATE_SESSION_POLICY")
            .ok()
            .and_then(|s| s.parse::<SessionCreationPolicy>().ok())
            .unwrap_or(defaults.session_policy);
        let session_ttl_secs = std::env::var("HEADGATE_SESSION_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(defaults.session_ttl_secs);
        Self { http_port, trusted_header, session_policy, session_ttl_secs }
    }
}

/// Shared server state injected into all handlers.
#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<IdentityResolver>,
    pub trusted_header: String,
}

impl AppState {
    pub fn new(config: &ServerConfig, directory: Arc<dyn UserDirectory>) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session_policy, config.session_ttl_secs));
        Self {
            resolver: Arc::new(IdentityResolver::new(directory, sessions)),
            trusted_header: config.trusted_header.clone(),
        }
    }
}

/// Mount all routes behind the identity middleware.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/whoami", get(whoami))
        .route("/logout", post(logout))
        .layer(middleware::from_fn_with_state(state.clone(), resolve_identity))
        .with_state(state)
}

/// Start the HTTP server with the given configuration and user directory.
pub async fn run_with_config(
    config: ServerConfig,
    directory: Arc<dyn UserDirectory>,
) -> anyhow::Result<()> {
    let state = AppState::new(&config, directory);
    let app = build_router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", config.http_port).parse()?;
    info!(
        "Starting server on {} (trusted_header='{}', session_policy={:?}, session_ttl_secs={})",
        addr, config.trusted_header, config.session_policy, config.session_ttl_secs
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Convenience entry point: environment configuration and the stock demo
/// directory.
pub async fn run() -> anyhow::Result<()> {
    run_with_config(ServerConfig::from_env(), Arc::new(StaticDirectory::demo())).await
}

fn parse_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    let cookie = headers.get("cookie").or_else(|| headers.get("Cookie"))?;
    let s = cookie.to_str().ok()?;
    for part in s.split(';') {
        let p = part.trim();
        if let Some(eq) = p.find('=') {
            let (k, v) = p.split_at(eq);
            if k == name {
                return Some(v[1..].to_string());
            }
        }
    }
    None
}

fn set_session_cookie(token: &str) -> HeaderValue {
    // Secure, HttpOnly cookie scoped to path / with SameSite=Strict
    HeaderValue::from_str(&format!(
        "{}={}; HttpOnly; Secure; SameSite=Strict; Path=/",
        SESSION_COOKIE, token
    ))
    .unwrap()
}

fn clear_session_cookie() -> HeaderValue {
    HeaderValue::from_str(&format!(
        "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; HttpOnly; Secure; SameSite=Strict; Path=/",
        SESSION_COOKIE
    ))
    .unwrap()
}

/// Extract the trusted header value, treating an empty or non-UTF8 value as
/// absent.
fn trusted_header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// The pipeline: resolve identity once per request, attach the outcome, and
/// reflect any session-store write in the response headers.
async fn resolve_identity(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let header_value = trusted_header_value(request.headers(), &state.trusted_header);
    let token = parse_cookie(request.headers(), SESSION_COOKIE);

    match state.resolver.resolve(header_value.as_deref(), token.as_deref()) {
        Ok(resolution) => {
            let ctx = RequestContext::new(resolution.context.clone());
            debug!(target: "identity", request_id = %ctx.request_id,
                principal = ctx.principal().map(|p| p.name.as_str()).unwrap_or("-"),
                "request identity resolved");
            request.extensions_mut().insert(ctx);

            let mut response = next.run(request).await;
            if let Some(issued) = &resolution.issued {
                response.headers_mut().append(SET_COOKIE, set_session_cookie(issued));
            } else if resolution.cleared {
                response.headers_mut().append(SET_COOKIE, clear_session_cookie());
            }
            response
        }
        Err(err) => {
            match &err {
                // Policy and internal faults are wiring bugs, never expected traffic
                AppError::Policy { .. } | AppError::Internal { .. } => {
                    error!("identity resolution fault: {}", err)
                }
                _ => debug!("authentication failed: {}", err),
            }
            let status = StatusCode::from_u16(err.http_status())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let mut response =
                (status, Json(json!({"status": "error", "error": err}))).into_response();
            // A rejected request never keeps its cookie
            if token.is_some() {
                response.headers_mut().append(SET_COOKIE, clear_session_cookie());
            }
            response
        }
    }
}

/// Open route: greets whoever the pipeline resolved, or anonymous.
async fn index(Extension(ctx): Extension<RequestContext>) -> String {
    match ctx.principal() {
        Some(p) => format!("Username={}", p.name),
        None => "Username=anonymous".to_string(),
    }
}

/// Authenticated route: echoes the full resolved context.
async fn whoami(Extension(ctx): Extension<RequestContext>) -> (StatusCode, Json<serde_json::Value>) {
    match &ctx.context {
        Some(sc) => (StatusCode::OK, Json(json!({"status": "ok", "context": sc}))),
        None => (StatusCode::UNAUTHORIZED, Json(json!({"status": "unauthorized"}))),
    }
}

/// Invalidate the presented session token. Idempotent by contract, so a
/// missing or stale cookie still yields 200.
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> impl IntoResponse {
    if let Some(token) = parse_cookie(&headers, SESSION_COOKIE) {
        state.resolver.sessions().invalidate(&token);
    }
    let mut h = HeaderMap::new();
    h.insert("Set-Cookie", clear_session_cookie());
    (StatusCode::OK, h, Json(json!({"status": "ok"})))
}
