use std::path::Path;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use shared::CreateGuessRequest;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use crate::domain::GuessService;
use crate::error::ApiError;

/// Application state shared by the handlers
#[derive(Clone)]
pub struct AppState {
    pub guess_service: GuessService,
}

impl AppState {
    pub fn new(guess_service: GuessService) -> Self {
        Self { guess_service }
    }
}

/// Axum handler function for GET /api/palpites
pub async fn list_guesses(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/palpites");

    match state.guess_service.list_guesses().await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Axum handler function for POST /api/palpites
pub async fn create_guess(
    State(state): State<AppState>,
    payload: Result<Json<CreateGuessRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(json) => json,
        Err(rejection) => {
            info!("POST /api/palpites - rejected body: {}", rejection.body_text());
            return ApiError::MalformedJson.into_response();
        }
    };
    info!("POST /api/palpites - request: {:?}", request);

    match state.guess_service.create_guess(request).await {
        Ok(response) => (StatusCode::CREATED, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Axum handler function for GET /api/stats
pub async fn get_stats(State(state): State<AppState>) -> impl IntoResponse {
    info!("GET /api/stats");

    match state.guess_service.stats().await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Axum handler function for DELETE /api/palpites
pub async fn clear_guesses(State(state): State<AppState>) -> impl IntoResponse {
    info!("DELETE /api/palpites");

    match state.guess_service.clear_guesses().await {
        Ok(response) => (StatusCode::OK, Json(response)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Build the application router: the guess API under `/api`, with the
/// static site (when configured) answering every other path.
pub fn create_router(state: AppState, static_dir: Option<&Path>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    let api_routes = Router::new()
        .route("/palpites", get(list_guesses).post(create_guess).delete(clear_guesses))
        .route("/stats", get(get_stats));

    let mut app = Router::new().nest("/api", api_routes);
    if let Some(dir) = static_dir {
        info!("Serving static files from {}", dir.display());
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(SetResponseHeaderLayer::overriding(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    ))
    .layer(cors)
    .with_state(state)
}
