use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::State,
    http::{self, header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::account::file_store::FileAccountStore;
use crate::account::{Account, AccountStore, WidgetSettings, WidgetSettingsUpdate};
use crate::answer::{AnswerChannel, AnsweringService};
use crate::config::Config;
use crate::context::collector::{ContextCollector, SessionInit, TurnOutcome};
use crate::context::finalizer;
use crate::error::{ProviderError, QueryMateError, SessionError};
use crate::provider::gemini::GeminiProvider;
use crate::provider::ModelGateway;
use crate::service::auth;
use crate::session::file_store::FileSessionStore;
use crate::session::store::SessionStore;

/// Shared application state for the HTTP API.
pub struct AppState {
    pub config: Config,
    pub accounts: Arc<dyn AccountStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub collector: ContextCollector,
    pub answering: AnsweringService,
    /// Fallback answering context for accounts without a finalized blob.
    pub default_context: String,
}

impl AppState {
    /// Wire up stores, the Gemini-backed gateway, and both services from
    /// configuration.
    pub fn from_config(config: Config) -> Self {
        let data_dir = config.storage.data_path();
        let accounts: Arc<dyn AccountStore> = Arc::new(FileAccountStore::new(&data_dir));
        let sessions: Arc<dyn SessionStore> = Arc::new(FileSessionStore::new(&data_dir));

        let provider = Arc::new(GeminiProvider::new(
            config.gemini.api_key.clone(),
            config.gemini.api_base.clone(),
            config.models.max_output_tokens,
            config.models.temperature,
        ));
        let gateway = Arc::new(ModelGateway::new(
            provider,
            Duration::from_millis(config.models.timeout_ms),
        ));

        let collector = ContextCollector::new(gateway.clone(), config.models.collection.clone());
        let answering = AnsweringService::new(gateway, config.models.answering.clone());

        let default_context = config
            .server
            .default_context_path
            .as_deref()
            .map(|path| match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(e) => {
                    warn!("Failed to load default context from {}: {}", path, e);
                    String::new()
                }
            })
            .unwrap_or_default();

        if config.gemini.api_key.is_empty() {
            warn!("Missing Gemini API key; model calls will fail");
        }

        Self {
            config,
            accounts,
            sessions,
            collector,
            answering,
            default_context,
        }
    }

    fn answering_context<'a>(&'a self, account: Option<&'a Account>) -> &'a str {
        match account {
            Some(a) if !a.context_data.is_empty() => &a.context_data,
            _ => &self.default_context,
        }
    }
}

/// JSON error response with an HTTP status.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self { status: StatusCode::BAD_REQUEST, message: message.into() }
    }

    fn unauthorized(message: impl Into<String>) -> Self {
        Self { status: StatusCode::UNAUTHORIZED, message: message.into() }
    }

    fn internal(message: impl Into<String>) -> Self {
        Self { status: StatusCode::INTERNAL_SERVER_ERROR, message: message.into() }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<QueryMateError> for ApiError {
    fn from(err: QueryMateError) -> Self {
        match &err {
            QueryMateError::Session(SessionError::AlreadyComplete)
            | QueryMateError::Session(SessionError::NotComplete) => {
                ApiError::bad_request(err.to_string())
            }
            _ => ApiError::internal(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Authentication — always an explicit Option, never an early failure
// ---------------------------------------------------------------------------

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?;
    Some(token.trim().to_string())
}

/// Resolve the Authorization bearer token to an account, if any.
fn authenticate_token(state: &AppState, headers: &HeaderMap) -> Option<Account> {
    let token = bearer_token(headers)?;
    let account_id = state.accounts.resolve_token(&token)?;
    state.accounts.find_by_id(&account_id)
}

/// Resolve the X-API-Key header to an account, if any.
fn authenticate_api_key(state: &AppState, headers: &HeaderMap) -> Option<Account> {
    let key = headers.get("x-api-key")?.to_str().ok()?;
    state.accounts.find_by_api_key(key.trim())
}

fn require_account(account: Option<Account>) -> Result<Account, ApiError> {
    account.ok_or_else(|| ApiError::unauthorized("Authentication required"))
}

// ---------------------------------------------------------------------------
// Request/response bodies
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CredentialsRequest {
    #[serde(default)]
    email: String,
    #[serde(default)]
    password: String,
}

#[derive(Debug, Serialize)]
struct AuthResponse {
    token: String,
    user: UserSummary,
}

#[derive(Debug, Serialize)]
struct UserSummary {
    email: String,
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ContextUpdateRequest {
    #[serde(default)]
    context_data: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WidgetSettingsRequest {
    widget_settings: Option<WidgetSettingsUpdate>,
}

#[derive(Debug, Deserialize)]
struct MessageRequest {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CompleteRequest {
    #[serde(default)]
    final_context: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

/// Create the axum Router with all API routes.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/widget.js", get(handle_widget_js))
        // Accounts
        .route("/api/register", post(handle_register))
        .route("/api/login", post(handle_login))
        .route("/api/user/context", get(handle_get_context))
        .route("/api/user/context", post(handle_update_context))
        .route("/api/user/api-key", get(handle_get_api_key))
        .route("/api/user/api-key", post(handle_generate_api_key))
        .route("/api/user/widget-settings", get(handle_get_widget_settings))
        .route("/api/user/widget-settings", put(handle_update_widget_settings))
        // Widget-facing
        .route("/api/widget-settings", get(handle_public_widget_settings))
        .route("/api/chat/public", post(handle_public_chat))
        // Context collection
        .route("/api/context-session", get(handle_get_session))
        .route("/api/context-session", delete(handle_reset_session))
        .route("/api/context-session/message", post(handle_session_message))
        .route("/api/context-session/complete", post(handle_complete_session))
        // Dashboard chat
        .route("/api/chat", post(handle_chat))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::PUT,
                    http::Method::DELETE,
                    http::Method::OPTIONS,
                ])
                .allow_headers([
                    header::CONTENT_TYPE,
                    header::AUTHORIZATION,
                    header::HeaderName::from_static("x-api-key"),
                ]),
        )
        .with_state(state)
}

async fn handle_root() -> impl IntoResponse {
    "QueryMate backend is running"
}

async fn handle_health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: crate::VERSION.to_string(),
    })
}

/// GET /widget.js — the embeddable widget script.
async fn handle_widget_js(State(state): State<Arc<AppState>>) -> Response {
    let path = Path::new(&state.config.server.public_dir).join("widget.js");
    match tokio::fs::read(&path).await {
        Ok(body) => (
            [(header::CONTENT_TYPE, "application/javascript")],
            body,
        )
            .into_response(),
        Err(_) => (StatusCode::NOT_FOUND, "Widget file not found").into_response(),
    }
}

// ---------------------------------------------------------------------------
// Account handlers
// ---------------------------------------------------------------------------

fn issue_token(state: &AppState, account: &Account) -> Result<String, ApiError> {
    let token = auth::generate_token();
    let expires_at = chrono::Utc::now() + chrono::Duration::days(state.config.auth.token_ttl_days);
    state
        .accounts
        .put_token(&token, &account.id, expires_at)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(token)
}

/// POST /api/register
async fn handle_register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }
    if state.accounts.find_by_email(&req.email).is_some() {
        return Err(ApiError::bad_request("User already exists"));
    }

    let hash = auth::hash_password(&req.password).map_err(|e| ApiError::internal(e.to_string()))?;
    let account = Account::new(&req.email, hash);
    state
        .accounts
        .create(&account)
        .map_err(|e| ApiError::internal(e.to_string()))?;

    info!("Registered account {}", account.email);
    let token = issue_token(&state, &account)?;
    Ok(Json(AuthResponse {
        token,
        user: UserSummary { email: account.email, id: account.id },
    }))
}

/// POST /api/login
async fn handle_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CredentialsRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    if req.email.is_empty() || req.password.is_empty() {
        return Err(ApiError::bad_request("Email and password are required"));
    }

    let account = state
        .accounts
        .find_by_email(&req.email)
        .filter(|a| auth::verify_password(&req.password, &a.password_hash))
        .ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    let token = issue_token(&state, &account)?;
    Ok(Json(AuthResponse {
        token,
        user: UserSummary { email: account.email, id: account.id },
    }))
}

/// GET /api/user/context
async fn handle_get_context(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let account = require_account(authenticate_token(&state, &headers))?;
    Ok(Json(json!({
        "contextData": account.context_data,
        "apiKey": account.api_key,
    })))
}

/// POST /api/user/context — set the context blob verbatim.
async fn handle_update_context(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<ContextUpdateRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut account = require_account(authenticate_token(&state, &headers))?;
    account.context_data = req.context_data.unwrap_or_default();
    state
        .accounts
        .save(&account)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(json!({ "message": "Context data updated successfully" })))
}

/// GET /api/user/api-key — current key without regenerating.
async fn handle_get_api_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let account = require_account(authenticate_token(&state, &headers))?;
    Ok(Json(json!({ "apiKey": account.api_key })))
}

/// POST /api/user/api-key — generate or regenerate. The previous key, if
/// any, stops resolving.
async fn handle_generate_api_key(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut account = require_account(authenticate_token(&state, &headers))?;
    let key = auth::generate_api_key(&state.config.auth.api_key_prefix, &account.email);
    account.api_key = Some(key.clone());
    state
        .accounts
        .save(&account)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    info!("Regenerated API key for {}", account.email);
    Ok(Json(json!({
        "apiKey": key,
        "message": "API key generated successfully",
    })))
}

/// GET /api/widget-settings — widget-facing; defaults when the key is
/// unknown or absent so the embed never breaks.
async fn handle_public_widget_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Json<serde_json::Value> {
    let settings = authenticate_api_key(&state, &headers)
        .map(|a| a.widget_settings)
        .unwrap_or_default();
    Json(json!({ "widgetSettings": settings }))
}

/// GET /api/user/widget-settings
async fn handle_get_widget_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let account = require_account(authenticate_token(&state, &headers))?;
    Ok(Json(json!({ "widgetSettings": account.widget_settings })))
}

/// PUT /api/user/widget-settings
async fn handle_update_widget_settings(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<WidgetSettingsRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut account = require_account(authenticate_token(&state, &headers))?;
    let update = req
        .widget_settings
        .ok_or_else(|| ApiError::bad_request("Widget settings are required"))?;
    account.widget_settings.apply(update);
    state
        .accounts
        .save(&account)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    Ok(Json(json!({
        "message": "Widget settings updated successfully",
        "widgetSettings": account.widget_settings,
    })))
}

// ---------------------------------------------------------------------------
// Context-collection handlers
// ---------------------------------------------------------------------------

/// GET /api/context-session — get or lazily create the session.
async fn handle_get_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<SessionInit>, ApiError> {
    let account = require_account(authenticate_token(&state, &headers))?;
    let init = state
        .collector
        .get_or_init(
            state.sessions.as_ref(),
            &account.email,
            !account.context_data.is_empty(),
        )
        .await?;
    Ok(Json(init))
}

/// POST /api/context-session/message
async fn handle_session_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<MessageRequest>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let account = require_account(authenticate_token(&state, &headers))?;
    if req.message.is_empty() {
        return Err(ApiError::bad_request("Message is required"));
    }

    let outcome = state
        .collector
        .submit_message(state.sessions.as_ref(), &account.email, &req.message)
        .await?;
    Ok(Json(outcome))
}

/// POST /api/context-session/complete — finalize the collected fields into
/// the account's context blob. The session row survives; reset is separate.
async fn handle_complete_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<CompleteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut account = require_account(authenticate_token(&state, &headers))?;

    let session = state
        .sessions
        .get(&account.email)
        .ok_or_else(|| ApiError::bad_request("Session not found or not complete"))?;
    let blob = finalizer::finalize(&session, req.final_context)
        .map_err(|_| ApiError::bad_request("Session not found or not complete"))?;

    account.context_data = blob.clone();
    state
        .accounts
        .save(&account)
        .map_err(|e| ApiError::internal(e.to_string()))?;
    info!("Finalized context for {}", account.email);

    Ok(Json(json!({
        "message": "Context data saved successfully!",
        "contextData": blob,
    })))
}

/// DELETE /api/context-session
async fn handle_reset_session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let account = require_account(authenticate_token(&state, &headers))?;
    state.collector.reset(state.sessions.as_ref(), &account.email);
    Ok(Json(json!({ "message": "Context session reset successfully" })))
}

// ---------------------------------------------------------------------------
// Answering handlers — asymmetric failure policy
// ---------------------------------------------------------------------------

/// POST /api/chat/public — widget chat, authenticated by API key. Total
/// model failure is a hard error here.
async fn handle_public_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<MessageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.message.is_empty() {
        return Err(ApiError::bad_request("Message is required"));
    }
    let account = authenticate_api_key(&state, &headers)
        .ok_or_else(|| ApiError::unauthorized("Invalid API key"))?;

    let context = state.answering_context(Some(&account));
    match state
        .answering
        .answer(context, &req.message, AnswerChannel::Public)
        .await
    {
        Ok(reply) => Ok(Json(json!({ "reply": reply }))),
        Err(e) => {
            error!("Public chat failed for {}: {}", account.email, e);
            Err(ApiError::internal(e.to_string()))
        }
    }
}

/// POST /api/chat — dashboard chat, optional auth. Total model failure
/// degrades to an inline notice instead of an error.
async fn handle_chat(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(req): Json<MessageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.message.is_empty() {
        return Err(ApiError::bad_request("Message is required"));
    }
    let account = authenticate_token(&state, &headers);

    let context = state.answering_context(account.as_ref());
    match state
        .answering
        .answer(context, &req.message, AnswerChannel::Dashboard)
        .await
    {
        Ok(reply) => Ok(Json(json!({ "reply": reply }))),
        Err(e) => {
            error!("Dashboard chat degraded: {}", e);
            Ok(Json(json!({
                "reply": format!("Note: live AI unavailable. (Details: {})", degrade_detail(&e)),
            })))
        }
    }
}

/// Unwrap the exhaustion wrapper so the inline notice names the concrete
/// failure.
fn degrade_detail(err: &ProviderError) -> String {
    match err {
        ProviderError::AllModelsFailed(inner) => inner.to_string(),
        other => other.to_string(),
    }
}

/// Start the HTTP server on the given address.
pub async fn serve(addr: &str, state: Arc<AppState>) -> anyhow::Result<()> {
    let router = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}
