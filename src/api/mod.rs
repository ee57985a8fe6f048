pub mod auth;
mod comments;
pub mod error;
mod sessions;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public except /me and /logout, which read the token)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/me", get(auth::me));

    // Session routes; every handler takes the current `User`, so all of
    // them require a valid login
    let session_routes = Router::new()
        .route(
            "/",
            get(sessions::list_available).post(sessions::create_session),
        )
        .route("/joined", get(sessions::list_joined))
        .route(
            "/:id",
            get(sessions::get_session)
                .put(sessions::update_session)
                .delete(sessions::delete_session),
        )
        .route("/:id/join", post(sessions::join_session))
        .route("/:id/leave", post(sessions::leave_session))
        .route(
            "/:id/comments",
            get(comments::list_comments).post(comments::add_comment),
        )
        .route("/:id/location", get(sessions::suggest_location));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/auth", auth_routes)
        .nest("/api/sessions", session_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
