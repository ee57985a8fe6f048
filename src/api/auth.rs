use axum::{
    async_trait,
    extract::{FromRequestParts, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::sync::Arc;

use crate::db::{LoginRequest, LoginResponse, RegisterRequest, User, UserResponse};
use crate::AppState;

use super::error::{ApiError, ValidationErrorBuilder};
use crate::validation::{
    validate_email, validate_password, validate_password_confirmation, validate_username,
};

/// Validate a RegisterRequest, reporting every bad field at once
fn validate_register_request(req: &RegisterRequest) -> Result<(), ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    errors.check("username", validate_username(req.username.trim()));
    errors.check("email", validate_email(&req.email.trim().to_lowercase()));
    errors.check("password", validate_password(&req.password));
    errors.check(
        "password_confirm",
        validate_password_confirmation(&req.password, &req.password_confirm),
    );

    errors.finish()
}

/// Login tokens presented with a request: the cookie first, then
/// `Authorization: Bearer`
fn extract_tokens(headers: &HeaderMap, cookie_name: &str) -> Vec<String> {
    let mut tokens = Vec::new();

    let jar = CookieJar::from_headers(headers);
    if let Some(cookie) = jar.get(cookie_name) {
        if !cookie.value().is_empty() {
            tokens.push(cookie.value().to_string());
        }
    }

    let bearer = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        if !tokens.contains(&token) {
            tokens.push(token);
        }
    }

    tokens
}

fn login_cookie(state: &AppState, token: String) -> Cookie<'static> {
    Cookie::build((state.config.auth.cookie_name.clone(), token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.auth.secure_cookies)
        .build()
}

/// Registration endpoint
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    validate_register_request(&request)?;

    let user = state.identity.register(&request).await?;
    Ok((StatusCode::CREATED, Json(UserResponse::from(user))))
}

/// Login endpoint. Sets the login cookie and also returns the token for
/// clients that prefer a bearer header.
pub async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), ApiError> {
    if request.email.trim().is_empty() || request.password.is_empty() {
        return Err(ApiError::validation_field(
            "email",
            "Email and password are required",
        ));
    }

    let (token, user) = state
        .identity
        .login(&request.email, &request.password)
        .await?;

    let jar = jar.add(login_cookie(&state, token.clone()));
    Ok((
        jar,
        Json(LoginResponse {
            token,
            user: UserResponse::from(user),
        }),
    ))
}

/// Logout endpoint. Revokes the token and clears the cookie.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode), ApiError> {
    let cookie_name = state.config.auth.cookie_name.clone();
    for token in extract_tokens(&headers, &cookie_name) {
        state.identity.logout(&token).await?;
    }

    let jar = jar.remove(Cookie::build((cookie_name, "")).path("/"));
    Ok((jar, StatusCode::NO_CONTENT))
}

/// Current user
pub async fn me(user: User) -> Json<UserResponse> {
    Json(UserResponse::from(user))
}

/// Extractor for getting the current authenticated user from a request
#[async_trait]
impl FromRequestParts<Arc<AppState>> for User {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let tokens = extract_tokens(&parts.headers, &state.config.auth.cookie_name);
        if tokens.is_empty() {
            return Err(ApiError::unauthorized("Please log in to access this page."));
        }

        // A stale cookie must not shadow a valid bearer token
        for token in &tokens {
            if let Some(user) = state.identity.is_authenticated(token).await? {
                return Ok(user);
            }
        }

        Err(ApiError::unauthorized(
            "Your login has expired. Please log in again.",
        ))
    }
}
