use axum::{
    Router,
    extract::{Path, Query, State},
    http::{HeaderValue, Request, StatusCode},
    middleware::{Next, from_fn},
    response::Json,
    routing::{get, post},
};
use case_flow::GraphError;
use serde_json::{Value, json};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Instrument, error, info, warn};
use uuid::Uuid;

use crate::{
    models::{
        AnswerRequest, ContinueResponse, ConversationQuery, SessionSnapshot, StartConsultationRequest,
        StartResponse,
    },
    session::{ConsultationManager, SessionError},
};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<Value>)>;
type ApiError = (StatusCode, Json<Value>);

fn bad_request_error(message: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message })))
}

/// Error payload for a failed session call. Unknown conversations and run
/// failures are reported as JSON, never as a bare status.
fn session_error(error: SessionError) -> ApiError {
    match error {
        SessionError::UnknownConversation(id) => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": "Invalid conversation_id",
                "conversation_id": id
            })),
        ),
        SessionError::Workflow(e) => {
            let kind = match &e {
                GraphError::StepLimitExceeded { .. } => "step_limit_exceeded",
                GraphError::InvariantViolation { .. } => "invariant_violation",
                GraphError::NotSuspended(_) => "not_waiting_for_input",
                GraphError::StorageError(_) => "storage_error",
                _ => "workflow_error",
            };
            error!(error = %e, kind, "Consultation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "The consultation could not continue",
                    "kind": kind,
                    "details": e.to_string()
                })),
            )
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub consultations: ConsultationManager,
}

pub fn create_app(consultations: ConsultationManager) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/diagnose/start", post(start_consultation))
        .route("/diagnose/continue", post(continue_consultation))
        .route("/diagnose/{conversation_id}", get(get_consultation))
        .layer(from_fn(correlation_id_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { consultations })
}

/// Give every request a correlation id and run it inside a span carrying it
async fn correlation_id_middleware(
    mut request: Request<axum::body::Body>,
    next: Next,
) -> axum::response::Response {
    let correlation_id = Uuid::new_v4().to_string();
    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        request.headers_mut().insert("x-correlation-id", value);
    }

    let span = tracing::info_span!("http_request", correlation_id = %correlation_id);
    next.run(request).instrument(span).await
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Diagnostic Consultation Service",
        "version": "0.1.0",
        "description": "Multi-stage diagnostic interview with lab review, triage and specialist analysis",
        "endpoints": {
            "POST /diagnose/start": "Open a consultation from patient data",
            "POST /diagnose/continue?conversation_id={id}": "Answer the pending question",
            "GET /diagnose/{conversation_id}": "Consultation status and results",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn start_consultation(
    State(state): State<AppState>,
    Json(request): Json<StartConsultationRequest>,
) -> ApiResult<StartResponse> {
    let intake = request.patient_data;
    if intake.symptoms.trim().is_empty() {
        return Err(bad_request_error("patient_data.symptoms is required"));
    }

    info!(attachments = intake.files.len(), "Starting consultation");
    let response = state
        .consultations
        .start(intake)
        .await
        .map_err(session_error)?;

    info!(
        conversation_id = %response.conversation_id,
        total_questions = response.total_questions,
        "Consultation started"
    );
    Ok(Json(response))
}

async fn continue_consultation(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
    Json(request): Json<AnswerRequest>,
) -> ApiResult<ContinueResponse> {
    if request.answer.trim().is_empty() {
        warn!(conversation_id = %query.conversation_id, "Empty answer rejected");
        return Err(bad_request_error("answer cannot be empty"));
    }

    let response = state
        .consultations
        .continue_consultation(&query.conversation_id, &request.answer)
        .await
        .map_err(session_error)?;
    Ok(Json(response))
}

async fn get_consultation(
    State(state): State<AppState>,
    Path(conversation_id): Path<String>,
) -> ApiResult<SessionSnapshot> {
    info!(conversation_id = %conversation_id, "Getting consultation status");
    state
        .consultations
        .status(&conversation_id)
        .await
        .map(Json)
        .map_err(session_error)
}
