//! Axum REST API — the callable surface over the workflow core.
//!
//! Interactive errors are surfaced verbatim as typed JSON bodies:
//! `{ "error": { "kind": ..., "message": ... } }`.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::contrib;
use crate::db;
use crate::errors::{Result, WorkflowError};
use crate::mailer::Mailer;
use crate::model::{ContributionStatus, Decision, PersonalInfo};
use crate::state;
use crate::token;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub mailer: Arc<Mailer>,
    pub config: Config,
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/applications/draft", post(save_draft))
        .route("/applications", post(submit_application))
        .route("/applications/:id", get(get_application))
        .route("/applications/:id/review", post(review_application))
        .route("/applications/:id/return", post(return_application))
        .route("/applications/:id/final", post(final_approval))
        .route("/applications/:id/notes", post(add_note).get(list_notes))
        .route(
            "/applications/:id/endorsement/resend",
            post(resend_endorsement),
        )
        .route(
            "/endorsements/:token",
            get(validate_endorsement).post(decide_endorsement),
        )
        .route("/contributions", post(submit_contribution))
        .route("/contributions/:id/review", post(review_contribution))
        .route("/members/:id/contributions", get(member_contributions))
        .with_state(app_state)
}

impl IntoResponse for WorkflowError {
    fn into_response(self) -> Response {
        let status = match &self {
            WorkflowError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::PreconditionFailed(_) | WorkflowError::AlreadyProcessed(_) => {
                StatusCode::CONFLICT
            }
            WorkflowError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkflowError::TransportFailure(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({
            "error": { "kind": self.kind(), "message": self.to_string() }
        }));
        (status, body).into_response()
    }
}

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
pub struct ApplicationRequest {
    pub applicant_id: String,
    pub personal_info: PersonalInfo,
}

#[derive(Deserialize)]
pub struct ReviewRequest {
    pub decision: Decision,
    pub note: Option<String>,
    pub author: String,
}

#[derive(Deserialize)]
pub struct ReturnRequest {
    pub note: String,
    pub author: String,
}

#[derive(Deserialize)]
pub struct FinalRequest {
    pub decision: Decision,
}

#[derive(Deserialize)]
pub struct NoteRequest {
    pub note: String,
    pub author: String,
}

#[derive(Deserialize)]
pub struct ResendRequest {
    pub new_email: Option<String>,
}

#[derive(Deserialize)]
pub struct EndorseRequest {
    pub decision: Decision,
    pub notes: Option<String>,
    pub actor: Option<String>,
}

#[derive(Deserialize)]
pub struct ContributionRequest {
    pub member_id: String,
    pub month: String,
    pub amount: i64,
    pub receipt_url: String,
}

#[derive(Deserialize)]
pub struct ContributionReviewRequest {
    pub decision: ContributionStatus,
    pub reviewer: String,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `POST /applications/draft`
pub async fn save_draft(
    State(app_state): State<AppState>,
    Json(req): Json<ApplicationRequest>,
) -> Result<impl IntoResponse> {
    let app = state::save_draft(&app_state.pool, &req.applicant_id, req.personal_info).await?;
    Ok((StatusCode::CREATED, Json(app)))
}

/// `POST /applications` — final submission (or resubmission after return).
pub async fn submit_application(
    State(app_state): State<AppState>,
    Json(req): Json<ApplicationRequest>,
) -> Result<impl IntoResponse> {
    let app = state::submit(
        &app_state.pool,
        &app_state.mailer,
        &app_state.config,
        &req.applicant_id,
        req.personal_info,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(app)))
}

/// `GET /applications/:id`
pub async fn get_application(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let app = db::get_application(&app_state.pool, &id)
        .await?
        .ok_or_else(|| WorkflowError::NotFound(format!("application {id}")))?;
    Ok(Json(app))
}

/// `POST /applications/:id/review` — admin approve/reject.
pub async fn review_application(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReviewRequest>,
) -> Result<impl IntoResponse> {
    let app = state::record_admin_review(
        &app_state.pool,
        &app_state.mailer,
        &app_state.config,
        &id,
        req.decision,
        req.note.as_deref(),
        &req.author,
    )
    .await?;
    Ok(Json(app))
}

/// `POST /applications/:id/return`
pub async fn return_application(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ReturnRequest>,
) -> Result<impl IntoResponse> {
    let app = state::return_for_revision(
        &app_state.pool,
        &app_state.mailer,
        &app_state.config,
        &id,
        &req.note,
        &req.author,
    )
    .await?;
    Ok(Json(app))
}

/// `POST /applications/:id/final`
pub async fn final_approval(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<FinalRequest>,
) -> Result<impl IntoResponse> {
    let app = state::record_final_approval(
        &app_state.pool,
        &app_state.mailer,
        &app_state.config,
        &id,
        req.decision,
    )
    .await?;
    Ok(Json(app))
}

/// `POST /applications/:id/notes`
pub async fn add_note(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<NoteRequest>,
) -> Result<impl IntoResponse> {
    state::append_admin_note(&app_state.pool, &id, &req.note, &req.author).await?;
    Ok(StatusCode::CREATED)
}

/// `GET /applications/:id/notes`
pub async fn list_notes(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let notes = db::list_admin_notes(&app_state.pool, &id).await?;
    Ok(Json(serde_json::json!({ "notes": notes })))
}

/// `POST /applications/:id/endorsement/resend`
pub async fn resend_endorsement(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ResendRequest>,
) -> Result<impl IntoResponse> {
    state::resend_endorsement_request(
        &app_state.pool,
        &app_state.mailer,
        &app_state.config,
        &id,
        req.new_email.as_deref(),
    )
    .await?;
    Ok(Json(serde_json::json!({ "resent": true })))
}

/// `GET /endorsements/:token` — public, token is the sole credential.
pub async fn validate_endorsement(
    State(app_state): State<AppState>,
    Path(endorsement_token): Path<String>,
) -> Result<impl IntoResponse> {
    let app = token::validate(&app_state.pool, &endorsement_token).await?;
    Ok(Json(app))
}

/// `POST /endorsements/:token` — public, records the pastor's decision.
pub async fn decide_endorsement(
    State(app_state): State<AppState>,
    Path(endorsement_token): Path<String>,
    Json(req): Json<EndorseRequest>,
) -> Result<impl IntoResponse> {
    let app = token::validate(&app_state.pool, &endorsement_token).await?;
    let actor = req.actor.as_deref().unwrap_or("Pastor");
    let app = token::consume(
        &app_state.pool,
        &app_state.mailer,
        &app_state.config,
        &app.id,
        req.decision,
        req.notes.as_deref(),
        actor,
    )
    .await?;
    Ok(Json(app))
}

/// `POST /contributions`
pub async fn submit_contribution(
    State(app_state): State<AppState>,
    Json(req): Json<ContributionRequest>,
) -> Result<impl IntoResponse> {
    let contribution = contrib::submit_contribution(
        &app_state.pool,
        &req.member_id,
        &req.month,
        req.amount,
        &req.receipt_url,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(contribution)))
}

/// `POST /contributions/:id/review`
pub async fn review_contribution(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<ContributionReviewRequest>,
) -> Result<impl IntoResponse> {
    let contribution = contrib::review_contribution(
        &app_state.pool,
        &app_state.mailer,
        &id,
        req.decision,
        &req.reviewer,
    )
    .await?;
    Ok(Json(contribution))
}

/// `GET /members/:id/contributions`
pub async fn member_contributions(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let contributions = db::list_contributions_for_member(&app_state.pool, &id).await?;
    Ok(Json(serde_json::json!({
        "member_id": id,
        "count": contributions.len(),
        "contributions": contributions,
    })))
}
