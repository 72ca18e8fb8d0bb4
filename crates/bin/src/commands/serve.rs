//! Serve command - runs the Telegate gateway over HTTP.

use std::{sync::Arc, time::Duration};

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use serde::{Deserialize, Serialize};
use tokio::signal::unix::{SignalKind, signal};

use telegate::{
    ClientId, DenyReason, Error, SessionGateway, SignedRequest, SystemClock,
    challenge::Nonce,
    gateway::{GatewayConfig, GatewayResponse},
    registry::EndpointPattern,
};

use crate::backend::{create_store, data_dir, sealing_key};
use crate::cli::ServeArgs;
use crate::upstream::DirectoryUpstream;

const CLIENT_ID_HEADER: &str = "x-client-id";
const NONCE_HEADER: &str = "x-nonce";
const SIGNATURE_HEADER: &str = "x-signature";

/// Shared application state
#[derive(Clone)]
struct AppState {
    gateway: Arc<SessionGateway>,
    upstream: Arc<DirectoryUpstream>,
    admin_token: Option<Arc<str>>,
}

/// Run the Telegate server
pub async fn run(args: &ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = create_store(args).await?;
    let sealing_key = sealing_key(args).await?;
    let config = GatewayConfig::default()
        .with_challenge_ttl(Duration::from_secs(args.challenge_ttl_secs))
        .with_rotation_grace(Duration::from_secs(args.rotation_grace_secs))
        .with_max_pending_challenges(args.max_pending_challenges)
        .with_audit_capacity(args.audit_capacity);

    let gateway = Arc::new(
        SessionGateway::open(store, sealing_key, Arc::new(SystemClock::new()), config).await?,
    );
    let resources = data_dir(args).join("resources");
    tokio::fs::create_dir_all(&resources).await?;

    if args.admin_token.is_none() {
        tracing::warn!("No admin token configured; /admin routes are unauthenticated");
    }

    let state = AppState {
        gateway: gateway.clone(),
        upstream: Arc::new(DirectoryUpstream::new(&resources)),
        admin_token: args.admin_token.as_deref().map(Arc::from),
    };

    let admin = Router::new()
        .route("/clients", get(handle_list_clients).post(handle_enroll))
        .route("/clients/{id}", delete(handle_deenroll))
        .route("/clients/{id}/revoke", post(handle_revoke))
        .route("/clients/{id}/grant", post(handle_grant))
        .route("/clients/{id}/rotate", post(handle_rotate))
        .route("/clients/{id}/test", post(handle_test_connection))
        .route("/clients/{id}/export", post(handle_export))
        .route("/events", get(handle_events))
        .route("/stats", get(handle_stats))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let app = Router::new()
        .route("/health", get(handle_health))
        .route("/auth/challenge", post(handle_challenge))
        .route("/data/{*path}", post(handle_data))
        .nest("/admin", admin)
        .with_state(state);

    // Expired challenges are garbage collected once per validity window
    let purge_interval = gateway.config().challenge_ttl.max(Duration::from_secs(1));
    let purger = gateway.clone();
    let purge_task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(purge_interval);
        loop {
            ticker.tick().await;
            purger.purge_expired_challenges().await;
        }
    });

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    println!("Telegate gateway listening on http://{local_addr}");
    println!();
    println!("Available endpoints:");
    println!("  GET    /health                    - Liveness and backend");
    println!("  POST   /auth/challenge            - Issue a challenge");
    println!("  POST   /data/{{*path}}              - Signed protected request");
    println!("  GET    /admin/clients             - List clients");
    println!("  POST   /admin/clients             - Enroll a client");
    println!("  DELETE /admin/clients/{{id}}        - De-enroll a client");
    println!("  POST   /admin/clients/{{id}}/revoke - Revoke access");
    println!("  POST   /admin/clients/{{id}}/grant  - Grant access");
    println!("  POST   /admin/clients/{{id}}/rotate - Rotate keys");
    println!("  POST   /admin/clients/{{id}}/test   - Test connection");
    println!("  POST   /admin/clients/{{id}}/export - Export sealed key");
    println!("  GET    /admin/events              - Audit events");
    println!("  GET    /admin/stats               - Access statistics");
    println!();
    println!("Press Ctrl+C to shutdown");

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM, initiating graceful shutdown..."),
                _ = sigint.recv() => tracing::info!("Received SIGINT, initiating graceful shutdown..."),
            }
        })
        .await?;

    purge_task.abort();
    println!("Server shut down");
    Ok(())
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// HTTP rendering of a library error.
struct ApiError(StatusCode, String);

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self(StatusCode::BAD_REQUEST, message.into())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        let status = match &err {
            e if e.is_not_found() => StatusCode::NOT_FOUND,
            e if e.is_duplicate_client() => StatusCode::CONFLICT,
            e if e.is_validation_error() => StatusCode::BAD_REQUEST,
            Error::Challenge(e) if e.is_rate_limited() => StatusCode::TOO_MANY_REQUESTS,
            e if e.is_storage_failure() => StatusCode::SERVICE_UNAVAILABLE,
            Error::Gateway(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            tracing::error!(error = %err, "Request failed");
        }
        Self(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(ErrorBody { error: self.1 })).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

fn client_id(raw: &str) -> ApiResult<ClientId> {
    ClientId::new(raw).map_err(|e| ApiError::from(Error::from(e)))
}

// ============================================================================
// Public Handlers
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    backend: &'static str,
}

/// Handler for GET /health
async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        backend: state.gateway.backend_kind(),
    })
}

#[derive(Deserialize)]
struct ChallengeRequest {
    client_id: String,
}

#[derive(Serialize)]
struct ChallengeResponse {
    nonce: Nonce,
    expires_at: u64,
}

/// Handler for POST /auth/challenge
async fn handle_challenge(
    State(state): State<AppState>,
    Json(request): Json<ChallengeRequest>,
) -> ApiResult<Json<ChallengeResponse>> {
    let client_id = client_id(&request.client_id)?;
    let challenge = state.gateway.issue_challenge(&client_id).await?;
    Ok(Json(ChallengeResponse {
        nonce: challenge.nonce,
        expires_at: challenge.expires_at,
    }))
}

fn required_header<'a>(headers: &'a HeaderMap, name: &str) -> ApiResult<&'a str> {
    headers
        .get(name)
        .ok_or_else(|| ApiError::bad_request(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| ApiError::bad_request(format!("{name} header is not ASCII")))
}

fn signed_request(headers: &HeaderMap, endpoint: String) -> ApiResult<SignedRequest> {
    let client_id = client_id(required_header(headers, CLIENT_ID_HEADER)?)?;
    let nonce = Nonce::from_hex(required_header(headers, NONCE_HEADER)?)
        .map_err(|e| ApiError::from(Error::from(e)))?;
    let signature = hex::decode(required_header(headers, SIGNATURE_HEADER)?)
        .map_err(|e| ApiError::bad_request(format!("{SIGNATURE_HEADER}: {e}")))?;
    Ok(SignedRequest::new(client_id, nonce, signature, endpoint))
}

fn decision_status(reason: DenyReason) -> StatusCode {
    match reason {
        DenyReason::InvalidChallenge | DenyReason::SignatureMismatch => StatusCode::UNAUTHORIZED,
        DenyReason::AccessDenied => StatusCode::FORBIDDEN,
        DenyReason::StorageFailure => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Handler for POST /data/{*path} - one signed protected request
async fn handle_data(
    State(state): State<AppState>,
    Path(path): Path<String>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let request = signed_request(&headers, format!("/{path}"))?;
    let GatewayResponse { decision, body } =
        state.gateway.handle(&request, state.upstream.as_ref()).await?;

    match (decision.reason, body) {
        (None, Some(body)) => Ok((
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/octet-stream")],
            Bytes::from(body),
        )
            .into_response()),
        (reason, _) => {
            let status = reason.map_or(StatusCode::FORBIDDEN, decision_status);
            Ok((status, Json(decision)).into_response())
        }
    }
}

// ============================================================================
// Admin Handlers
// ============================================================================

/// Rejects admin requests without the configured bearer token.
async fn require_admin(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let Some(expected) = state.admin_token.as_deref() else {
        return next.run(request).await;
    };
    let presented = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    // blake3::Hash equality is constant time
    let authorized = presented
        .is_some_and(|token| blake3::hash(token.as_bytes()) == blake3::hash(expected.as_bytes()));
    if !authorized {
        tracing::warn!(path = %request.uri().path(), "Rejected admin request");
        return ApiError(StatusCode::UNAUTHORIZED, "admin token required".to_string())
            .into_response();
    }
    next.run(request).await
}

/// Handler for GET /admin/clients
async fn handle_list_clients(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.list_clients().await)
}

#[derive(Deserialize)]
struct EnrollRequest {
    client_id: String,
    #[serde(default)]
    endpoints: Vec<EndpointPattern>,
}

/// Handler for POST /admin/clients
async fn handle_enroll(
    State(state): State<AppState>,
    Json(request): Json<EnrollRequest>,
) -> ApiResult<impl IntoResponse> {
    let client_id = client_id(&request.client_id)?;
    let identity = state.gateway.enroll(&client_id, request.endpoints).await?;
    Ok((StatusCode::CREATED, Json(identity)))
}

/// Handler for DELETE /admin/clients/{id}
async fn handle_deenroll(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.gateway.deenroll(&client_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for POST /admin/clients/{id}/revoke
async fn handle_revoke(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.gateway.revoke_access(&client_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct GrantRequest {
    endpoints: Vec<EndpointPattern>,
}

/// Handler for POST /admin/clients/{id}/grant
async fn handle_grant(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<GrantRequest>,
) -> ApiResult<impl IntoResponse> {
    let record = state
        .gateway
        .grant_access(&client_id(&id)?, request.endpoints)
        .await?;
    Ok(Json(record))
}

#[derive(Serialize)]
struct RotateResponse {
    address: telegate::Address,
}

/// Handler for POST /admin/clients/{id}/rotate
async fn handle_rotate(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RotateResponse>> {
    let address = state.gateway.rotate_keys(&client_id(&id)?).await?;
    Ok(Json(RotateResponse { address }))
}

/// Handler for POST /admin/clients/{id}/test
async fn handle_test_connection(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let decision = state.gateway.test_connection(&client_id(&id)?).await?;
    Ok(Json(decision))
}

#[derive(Deserialize)]
struct ExportRequest {
    passphrase: String,
}

/// Handler for POST /admin/clients/{id}/export
async fn handle_export(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(request): Json<ExportRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.passphrase.is_empty() {
        return Err(ApiError::bad_request("passphrase must not be empty"));
    }
    let bundle = state
        .gateway
        .export_key(&client_id(&id)?, &request.passphrase)
        .await?;
    Ok(Json(bundle))
}

#[derive(Deserialize)]
struct EventsQuery {
    limit: Option<usize>,
    client_id: Option<String>,
}

/// Handler for GET /admin/events
async fn handle_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(100);
    let events = match query.client_id {
        Some(id) => {
            let mut events = state.gateway.events_for(&client_id(&id)?).await;
            events.reverse();
            events.truncate(limit);
            events
        }
        None => state.gateway.events(limit).await,
    };
    Ok(Json(events))
}

/// Handler for GET /admin/stats
async fn handle_stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.gateway.stats().await)
}
