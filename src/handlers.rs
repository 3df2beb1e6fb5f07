// handlers.rs
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Path, State,
    },
    response::IntoResponse,
    Json,
};
use http::StatusCode;
use serde_json::json;
use tracing::error;

use crate::error::{AppError, Result};
use crate::models::{
    CreatePollRequest, CreatePollResponse, MessageResponse, PollId, TallyAudit, VoteRequest,
};
use crate::state::AppState;

fn path_poll_id(path: std::result::Result<Path<PollId>, PathRejection>) -> Result<PollId> {
    path.map(|Path(id)| id)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

fn body<T>(payload: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| AppError::Validation(rejection.body_text()))
}

/// Create a poll with its options
pub async fn create_poll(
    State(state): State<Arc<AppState>>,
    payload: std::result::Result<Json<CreatePollRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let request = body(payload)?;
    let poll_id = state
        .catalog
        .create_poll(&request.question, &request.options)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreatePollResponse {
            message: "Poll created successfully",
            poll_id,
        }),
    ))
}

/// Get a poll with its current tallies
pub async fn get_poll(
    State(state): State<Arc<AppState>>,
    path: std::result::Result<Path<PollId>, PathRejection>,
) -> Result<impl IntoResponse> {
    let poll = state.catalog.get_poll(path_poll_id(path)?).await?;
    Ok(Json(poll))
}

/// Vote for an option of a poll
pub async fn cast_vote(
    State(state): State<Arc<AppState>>,
    path: std::result::Result<Path<PollId>, PathRejection>,
    payload: std::result::Result<Json<VoteRequest>, JsonRejection>,
) -> Result<impl IntoResponse> {
    let poll_id = path_poll_id(path)?;
    let request = body(payload)?;

    state
        .ledger
        .cast_vote(poll_id, &request.user_id, request.option_id)
        .await?;

    Ok(Json(MessageResponse {
        message: "Vote cast successfully",
    }))
}

/// Compare stored counters with the vote rows behind them
pub async fn audit_poll(
    State(state): State<Arc<AppState>>,
    path: std::result::Result<Path<PollId>, PathRejection>,
) -> Result<Json<TallyAudit>> {
    let audit = state.catalog.audit_tallies(path_poll_id(path)?).await?;
    Ok(Json(audit))
}

pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}
