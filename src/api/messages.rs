use crate::adapters::store::VoteOutcome;
use crate::api::AppState;
use crate::api::schemas::messages::{
    CountResponse, CreateMessageRequest, CreateMessageResponse, PurgeResponse, VoteRequest, VoteResponse,
};
use crate::error::Result;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

/// Posts a new message to the feed.
///
/// # Errors
/// Returns `AppError::Database` if the message cannot be stored.
pub async fn create_message(
    State(state): State<AppState>,
    Json(payload): Json<CreateMessageRequest>,
) -> Result<impl IntoResponse> {
    let id = state.message_service.create_message(payload.author_id, payload.text, payload.location).await?;
    Ok((StatusCode::CREATED, Json(CreateMessageResponse { id })))
}

/// Votes for a message.
///
/// Duplicates and unknown messages are reported in the body, never as errors.
///
/// # Errors
/// Returns `AppError::Database` if the store cannot be reached.
pub async fn cast_vote(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Json(payload): Json<VoteRequest>,
) -> Result<impl IntoResponse> {
    let outcome = state.message_service.cast_vote(message_id, payload.voter_id).await?;

    let status = match outcome {
        VoteOutcome::Recorded => StatusCode::CREATED,
        VoteOutcome::Duplicate => StatusCode::OK,
        VoteOutcome::NotFound => StatusCode::NOT_FOUND,
    };
    Ok((status, Json(VoteResponse { status: outcome.as_str().to_string() })))
}

/// # Errors
/// Returns `AppError::Database` if the store cannot be reached.
pub async fn count(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let count = state.message_service.count().await?;
    Ok(Json(CountResponse { count }))
}

/// # Errors
/// Returns `AppError::Database` if the store cannot be reached.
pub async fn purge(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let deleted = state.message_service.purge_all().await?;
    Ok(Json(PurgeResponse { deleted }))
}
