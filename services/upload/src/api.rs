use crate::config::ApiConfig;
use crate::identity::IdentityProvider;
use crate::metadata_store::MetadataStore;
use crate::models::{MediaFile, Principal, Upload};
use crate::orchestrator::{UploadOrchestrator, UploadOutcome, UploadStatus};
use crate::session::{AuthNavigator, AuthSession, AuthState, Session, View};
use crate::views::{load_gallery, welcome_message, RecipeView};
use anyhow::{Context, Result};
use axum::{
    async_trait,
    extract::{DefaultBodyLimit, FromRequestParts, Multipart, Query, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<UploadOrchestrator>,
    pub metadata_store: Arc<dyn MetadataStore>,
    pub identity: Arc<dyn IdentityProvider>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>, code: &str) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
            code: code.to_string(),
        }),
    )
}

/// Session resolved from the request's bearer token
pub struct RequestSession {
    pub auth: AuthSession,
    pub session: Session,
}

#[async_trait]
impl FromRequestParts<AppState> for RequestSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth = AuthSession::new(state.identity.clone(), bearer_token(&parts.headers));
        let session = auth.refresh().await;
        Ok(Self { auth, session })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Session summary
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub state: AuthState,
    pub principal: Option<Principal>,
    /// Where the client should navigate, if anywhere
    pub navigate: Option<&'static str>,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    /// Path the client is currently on
    #[serde(default = "default_view_path")]
    pub path: String,
}

fn default_view_path() -> String {
    "/".to_string()
}

/// Dashboard content
#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub message: String,
    pub links: Vec<&'static str>,
}

/// Gallery listing
#[derive(Debug, Serialize)]
pub struct GalleryResponse {
    pub recipes: Vec<RecipeView>,
}

/// Upload listing
#[derive(Debug, Serialize)]
pub struct UploadListResponse {
    pub uploads: Vec<Upload>,
}

/// Navigation instruction after sign-out
#[derive(Debug, Serialize)]
pub struct SignOutResponse {
    pub navigate: Option<&'static str>,
}

/// Create the API router
pub fn create_router(state: AppState, config: &ApiConfig) -> Router {
    let cors = if config.cors_enabled {
        if config.cors_origins.is_empty() {
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        } else {
            let origins: Vec<_> = config
                .cors_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new()
                .allow_origin(origins)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/api/v1/session", get(get_session))
        .route("/api/v1/dashboard", get(get_dashboard))
        .route("/api/v1/uploads", get(list_uploads).post(create_upload))
        .route("/api/v1/uploads/stream", post(stream_upload))
        .route("/api/v1/recipes", get(list_recipes))
        .route("/api/v1/auth/sign-out", post(sign_out))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "upload-service"
    }))
}

/// Readiness check endpoint
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.metadata_store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "status": "ready",
                "database": "connected"
            })),
        ),
        Err(e) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({
                "status": "not_ready",
                "database": "disconnected",
                "error": e.to_string()
            })),
        ),
    }
}

/// Current principal and landing view
async fn get_session(
    RequestSession { session, .. }: RequestSession,
    Query(query): Query<SessionQuery>,
) -> Json<SessionResponse> {
    let current = View::from_path(&query.path).unwrap_or(View::Root);
    let mut navigator = AuthNavigator::new();
    let navigate = navigator
        .initial(current, session.principal())
        .map(|v| v.path());

    Json(SessionResponse {
        state: session.state(),
        principal: session.principal().cloned(),
        navigate,
    })
}

async fn get_dashboard(RequestSession { session, .. }: RequestSession) -> Json<DashboardResponse> {
    Json(DashboardResponse {
        message: welcome_message(&session),
        links: vec![View::Upload.path(), View::Gallery.path()],
    })
}

/// Store, record and parse the multipart `file` field.
///
/// Answers with the final outcome only; `/api/v1/uploads/stream` reports each
/// status as it happens.
#[instrument(skip_all)]
async fn create_upload(
    State(state): State<AppState>,
    RequestSession { session, .. }: RequestSession,
    mut multipart: Multipart,
) -> Result<Json<UploadOutcome>, ApiError> {
    let file = read_upload(&mut multipart).await?;

    let (status, _) = mpsc::unbounded_channel();
    let outcome = state
        .orchestrator
        .submit_upload(&session, file, &status)
        .await;

    Ok(Json(outcome))
}

/// Same as `create_upload`, answered as server-sent events: one `status`
/// event per transition, then a single `outcome` event.
#[instrument(skip_all)]
async fn stream_upload(
    State(state): State<AppState>,
    RequestSession { session, .. }: RequestSession,
    mut multipart: Multipart,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let file = read_upload(&mut multipart).await?;
    let (events_tx, events_rx) = mpsc::unbounded_channel();

    // Runs to completion even if the client goes away
    tokio::spawn(async move {
        let (status_tx, mut status_rx) = mpsc::unbounded_channel();

        let forward = {
            let events_tx = events_tx.clone();
            async move {
                while let Some(status) = status_rx.recv().await {
                    let _ = events_tx.send(status_event(&status));
                }
            }
        };
        let run = async move {
            state
                .orchestrator
                .submit_upload(&session, file, &status_tx)
                .await
        };

        let (outcome, ()) = tokio::join!(run, forward);
        let _ = events_tx.send(outcome_event(&outcome));
    });

    let stream = UnboundedReceiverStream::new(events_rx).map(Ok::<Event, Infallible>);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn status_event(status: &UploadStatus) -> Event {
    Event::default().event("status").data(status.to_string())
}

fn outcome_event(outcome: &UploadOutcome) -> Event {
    Event::default()
        .event("outcome")
        .json_data(outcome)
        .unwrap_or_else(|e| Event::default().event("error").data(e.to_string()))
}

async fn read_upload(multipart: &mut Multipart) -> Result<Option<MediaFile>, ApiError> {
    read_file_field(multipart).await.map_err(|e| {
        error!(error = %e, "Malformed upload body");
        api_error(StatusCode::BAD_REQUEST, e.to_string(), "MALFORMED_UPLOAD")
    })
}

/// First multipart field named `file`, if any
async fn read_file_field(multipart: &mut Multipart) -> Result<Option<MediaFile>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .context("Failed to read multipart field")?
    {
        if field.name() != Some("file") {
            continue;
        }

        let name = field.file_name().unwrap_or_default().to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field.bytes().await.context("Failed to read file body")?;

        return Ok(Some(MediaFile::new(name, content_type, data.to_vec())));
    }

    Ok(None)
}

async fn list_uploads(
    State(state): State<AppState>,
    RequestSession { session, .. }: RequestSession,
) -> Result<Json<UploadListResponse>, ApiError> {
    let Some(principal) = session.principal() else {
        return Ok(Json(UploadListResponse { uploads: vec![] }));
    };

    let uploads = state
        .metadata_store
        .list_uploads(&principal.id)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to list uploads");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to list uploads",
                "QUERY_ERROR",
            )
        })?;

    Ok(Json(UploadListResponse { uploads }))
}

/// Recipe gallery
async fn list_recipes(
    State(state): State<AppState>,
    RequestSession { session, .. }: RequestSession,
) -> Result<Json<GalleryResponse>, ApiError> {
    let recipes = load_gallery(state.metadata_store.as_ref(), &session)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to load gallery");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to load recipes",
                "QUERY_ERROR",
            )
        })?;

    Ok(Json(GalleryResponse { recipes }))
}

async fn sign_out(
    RequestSession { auth, session }: RequestSession,
) -> Result<Json<SignOutResponse>, ApiError> {
    let mut navigator = AuthNavigator::new();
    navigator.on_change(session.principal());

    auth.sign_out().await.map_err(|e| {
        error!(error = %e, "Sign-out failed");
        api_error(StatusCode::BAD_GATEWAY, "Sign-out failed", "IDENTITY_ERROR")
    })?;

    let navigate = navigator
        .on_change(auth.snapshot().principal())
        .map(|v| v.path());

    Ok(Json(SignOutResponse { navigate }))
}

/// Start the upload API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting upload API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
