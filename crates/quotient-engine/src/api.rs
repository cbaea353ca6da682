//! HTTP API for driving a practice session.
//!
//! # Endpoints
//!
//! - `GET /api/session` - Current session snapshot
//! - `POST /api/problems/next` - Present the next problem
//! - `POST /api/answers` - Submit an answer
//! - `POST /api/hints` - Reveal the next hint
//! - `GET /api/metrics` - Session metrics
//! - `POST /api/plan` - Study plan for the session so far
//! - `POST /api/reset` - Start a new session
//! - `GET /ws` - Live event stream
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use quotient_engine::{
//!     create_router, EventBroadcaster, ProblemBank, SessionController, SessionPolicy,
//!     SessionService, Tutor,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bank = Arc::new(ProblemBank::load("data/problems.json")?);
//! let controller = SessionController::new(bank, SessionPolicy::default());
//! let service = SessionService::new(controller, Tutor::offline(), EventBroadcaster::default());
//!
//! let router = create_router(service);
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::enrichment::{Enriched, StudyPlan};
use crate::events::ws_handler;
use crate::metrics::Metrics;
use crate::service::{AnswerResult, HintResult, NextProblem, SessionService};
use crate::session::{Rejection, SessionSnapshot};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for `POST /api/answers`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerRequest {
    /// The learner's answer.
    pub answer: String,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

// ============================================================================
// API Error Type
// ============================================================================

/// A refused transition; always reported as 409.
#[derive(Debug)]
struct ApiError(Rejection);

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        Self(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(ErrorResponse {
            error: self.0.to_string(),
        });
        (StatusCode::CONFLICT, body).into_response()
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints and the WebSocket route.
pub fn create_router(service: SessionService) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/session", get(handle_session))
        .route("/problems/next", post(handle_next_problem))
        .route("/answers", post(handle_answer))
        .route("/hints", post(handle_hint))
        .route("/metrics", get(handle_metrics))
        .route("/plan", post(handle_plan))
        .route("/reset", post(handle_reset));

    Router::new()
        .nest("/api", api_routes)
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

// ============================================================================
// Handlers
// ============================================================================

async fn handle_session(State(service): State<SessionService>) -> Json<SessionSnapshot> {
    Json(service.snapshot().await)
}

async fn handle_next_problem(
    State(service): State<SessionService>,
) -> Result<Json<NextProblem>, ApiError> {
    let next = service.next_problem().await?;
    if let NextProblem::Presented { problem } = &next {
        info!(problem_id = %problem.id, level = %problem.level, "Problem presented");
    }
    Ok(Json(next))
}

async fn handle_answer(
    State(service): State<SessionService>,
    Json(request): Json<AnswerRequest>,
) -> Result<Json<AnswerResult>, ApiError> {
    let result = service.submit(&request.answer).await?;
    info!(
        problem_id = %result.problem_id,
        correct = result.correct,
        answered = result.answered,
        "Answer submitted"
    );
    Ok(Json(result))
}

async fn handle_hint(State(service): State<SessionService>) -> Result<Json<HintResult>, ApiError> {
    Ok(Json(service.hint().await?))
}

async fn handle_metrics(State(service): State<SessionService>) -> Json<Metrics> {
    Json(service.metrics().await)
}

async fn handle_plan(State(service): State<SessionService>) -> Json<Enriched<StudyPlan>> {
    Json(service.plan().await)
}

async fn handle_reset(State(service): State<SessionService>) -> Json<SessionSnapshot> {
    let snapshot = service.reset().await;
    info!(session_id = %snapshot.session_id, "Session reset via API");
    Json(snapshot)
}
