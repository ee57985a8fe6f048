use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::db::{CommentWithAuthor, CreateCommentRequest, SessionComment, User};
use crate::AppState;

use super::error::ApiError;
use super::sessions::validate_session_id;

pub async fn list_comments(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    _user: User,
) -> Result<Json<Vec<CommentWithAuthor>>, ApiError> {
    validate_session_id(&id)?;

    // 404 for unknown sessions rather than an empty list
    state.sessions.get_session(&id).await?;
    Ok(Json(state.sessions.list_comments(&id).await?))
}

pub async fn add_comment(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    user: User,
    Json(req): Json<CreateCommentRequest>,
) -> Result<(StatusCode, Json<SessionComment>), ApiError> {
    validate_session_id(&id)?;

    let comment = state.sessions.add_comment(&id, &user, &req.content).await?;
    Ok((StatusCode::CREATED, Json(comment)))
}
