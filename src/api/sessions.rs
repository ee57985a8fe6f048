//! Study session endpoints: CRUD, membership and room suggestions.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::db::{
    CreateSessionRequest, CreatedSession, SessionDetail, StudySession, UpdateSessionRequest, User,
};
use crate::sessions::LocationLabel;
use crate::validation::{
    validate_location, validate_time, validate_title, validate_topic, validate_uuid,
};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};

/// Validate the form fields shared by create and update.
/// Date parsing is left to the session rules, which own that error.
fn validate_fields(
    title: &str,
    time: &str,
    location: &str,
    topic: &Option<String>,
) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    errors.check("title", validate_title(title));
    errors.check("time", validate_time(time));
    errors.check("location", validate_location(location));
    errors.check("topic", validate_topic(topic));

    errors.finish()
}

pub(super) fn validate_session_id(id: &str) -> Result<(), ApiError> {
    validate_uuid(id, "session_id").map_err(|e| ApiError::validation_field("session_id", e))
}

/// Room suggestion response
#[derive(Debug, Serialize)]
pub struct LocationSuggestion {
    pub session_id: String,
    pub participant_count: i64,
    pub suggestion: LocationLabel,
}

/// Sessions the current user has not joined
pub async fn list_available(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<StudySession>>, ApiError> {
    Ok(Json(state.sessions.list_available(&user).await?))
}

/// Sessions the current user has joined (including their own)
pub async fn list_joined(
    State(state): State<Arc<AppState>>,
    user: User,
) -> Result<Json<Vec<StudySession>>, ApiError> {
    Ok(Json(state.sessions.list_joined(&user).await?))
}

pub async fn create_session(
    State(state): State<Arc<AppState>>,
    user: User,
    Json(req): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<CreatedSession>), ApiError> {
    validate_fields(&req.title, &req.time, &req.location, &req.topic)?;

    let created = state.sessions.create_session(&req, &user).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    _user: User,
) -> Result<Json<SessionDetail>, ApiError> {
    validate_session_id(&id)?;
    Ok(Json(state.sessions.session_detail(&id).await?))
}

pub async fn update_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    user: User,
    Json(req): Json<UpdateSessionRequest>,
) -> Result<Json<StudySession>, ApiError> {
    validate_session_id(&id)?;
    validate_fields(&req.title, &req.time, &req.location, &req.topic)?;

    Ok(Json(state.sessions.edit_session(&id, &req, &user).await?))
}

pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    user: User,
) -> Result<StatusCode, ApiError> {
    validate_session_id(&id)?;
    state.sessions.delete_session(&id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn join_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    user: User,
) -> Result<Json<SessionDetail>, ApiError> {
    validate_session_id(&id)?;
    state.sessions.join_session(&id, &user).await?;
    Ok(Json(state.sessions.session_detail(&id).await?))
}

pub async fn leave_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    user: User,
) -> Result<Json<SessionDetail>, ApiError> {
    validate_session_id(&id)?;
    state.sessions.leave_session(&id, &user).await?;
    Ok(Json(state.sessions.session_detail(&id).await?))
}

pub async fn suggest_location(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    _user: User,
) -> Result<Json<LocationSuggestion>, ApiError> {
    validate_session_id(&id)?;

    let session = state.sessions.get_session(&id).await?;
    let suggestion = state.sessions.suggest_location(&session).await?;
    let participant_count = state.sessions.participant_count(&id).await?;

    Ok(Json(LocationSuggestion {
        session_id: session.id,
        participant_count,
        suggestion,
    }))
}
