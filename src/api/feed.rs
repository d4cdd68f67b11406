use crate::api::AppState;
use crate::api::schemas::feed::{FeedRequest, FeedResponse};
use crate::error::{AppError, Result};
use axum::{Json, extract::State, response::IntoResponse};

/// Samples the messages inside a viewport.
///
/// # Errors
/// Returns `AppError::BadRequest` if more messages are requested than allowed.
pub async fn sample(State(state): State<AppState>, Json(payload): Json<FeedRequest>) -> Result<impl IntoResponse> {
    let max = state.config.feed.max_sample_size;
    if payload.num_messages > max {
        return Err(AppError::BadRequest(format!("numMessages must not exceed {max}")));
    }

    let messages =
        state.feed_service.sample(payload.num_messages, !payload.nsfw, payload.nw_coord, payload.se_coord).await?;

    Ok(Json(FeedResponse { messages, nw_coord: payload.nw_coord, se_coord: payload.se_coord }))
}
