use crate::backend::RecipeParser;
use crate::config::ApiConfig;
use crate::recipe::ParsedRecipe;
use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, instrument, warn};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub parser: Arc<dyn RecipeParser>,
}

/// Parse request. Accepts both snake_case and camelCase keys.
#[derive(Debug, Deserialize)]
pub struct ParseRequest {
    #[serde(alias = "uploadId")]
    pub upload_id: String,
    #[serde(alias = "fileUrl")]
    pub file_url: String,
}

/// `{"recipe": {...}}` on success, `{}` when no recipe could be extracted
#[derive(Debug, Serialize)]
pub struct ParseResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipe: Option<ParsedRecipe>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
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
        .route("/parse", post(parse_upload))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "parser-service"
    }))
}

/// Parse one stored upload into a recipe
#[instrument(skip_all, fields(upload_id = %request.upload_id, file_url = %request.file_url))]
async fn parse_upload(
    State(state): State<AppState>,
    Json(request): Json<ParseRequest>,
) -> Result<Json<ParseResponse>, (StatusCode, Json<ErrorResponse>)> {
    metrics::counter!("parser.requests").increment(1);

    match state.parser.parse(&request.file_url).await {
        Ok(Some(recipe)) => {
            info!(title = %recipe.title, "Recipe parsed");
            Ok(Json(ParseResponse {
                recipe: Some(recipe),
            }))
        }
        Ok(None) => {
            warn!("No recipe extracted");
            metrics::counter!("parser.failures", "reason" => "no_recipe").increment(1);
            Ok(Json(ParseResponse { recipe: None }))
        }
        Err(e) => {
            error!(error = %e, "Parsing failed");
            metrics::counter!("parser.failures", "reason" => "backend").increment(1);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(ErrorResponse {
                    error: e.to_string(),
                    code: "PARSE_ERROR".to_string(),
                }),
            ))
        }
    }
}

/// Start the parse API server
pub async fn start_api_server(state: AppState, config: &ApiConfig) -> Result<()> {
    let router = create_router(state, config);
    let addr = format!("{}:{}", config.host, config.port);

    info!(address = %addr, "Starting parse API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, router)
        .await
        .context("API server error")?;

    Ok(())
}
