//! User registration, credential checks and login tokens.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Duration;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::config::MAX_SESSION_TTL_HOURS;
use crate::db::{begin_write, DbPool, LoginSession, RegisterRequest, User};
use crate::error::{is_unique_violation, CoreError, CoreResult};
use crate::validation::{
    validate_email, validate_password, validate_password_confirmation, validate_username,
};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone)]
pub struct IdentityStore {
    db: DbPool,
    clock: Arc<dyn Clock>,
    session_ttl: Duration,
}

impl IdentityStore {
    pub fn new(db: DbPool, clock: Arc<dyn Clock>, session_ttl_hours: i64) -> Self {
        Self {
            db,
            clock,
            session_ttl: Duration::hours(session_ttl_hours.clamp(1, MAX_SESSION_TTL_HOURS)),
        }
    }

    pub async fn find_user_by_id(&self, id: &str) -> CoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn find_user_by_email(&self, email: &str) -> CoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    pub async fn find_user_by_username(&self, username: &str) -> CoreResult<Option<User>> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.db)
            .await?;
        Ok(user)
    }

    /// Create a new account. Username and email must be unused.
    pub async fn register(&self, req: &RegisterRequest) -> CoreResult<User> {
        let username = req.username.trim();
        let email = req.email.trim().to_lowercase();

        validate_username(username).map_err(|e| CoreError::validation("username", e))?;
        validate_email(&email).map_err(|e| CoreError::validation("email", e))?;
        validate_password(&req.password).map_err(|e| CoreError::validation("password", e))?;
        validate_password_confirmation(&req.password, &req.password_confirm)
            .map_err(|e| CoreError::validation("password_confirm", e))?;

        let password_hash =
            hash_password(&req.password).map_err(|e| CoreError::PasswordHash(e.to_string()))?;

        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: username.to_string(),
            email,
            password_hash,
            created_at: self.clock.now(),
        };

        let mut tx = begin_write(&self.db).await?;

        // Checked inside the transaction so the reported field is accurate;
        // the UNIQUE constraints still catch a concurrent registration.
        let taken: Option<(String, String)> =
            sqlx::query_as("SELECT username, email FROM users WHERE username = ? OR email = ?")
                .bind(&user.username)
                .bind(&user.email)
                .fetch_optional(&mut *tx)
                .await?;
        if let Some((existing_username, _)) = taken {
            let field = if existing_username == user.username {
                "username"
            } else {
                "email"
            };
            return Err(CoreError::UniqueConstraintViolation { field });
        }

        sqlx::query(
            "INSERT INTO users (id, username, email, password_hash, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                CoreError::UniqueConstraintViolation { field: "username or email" }
            } else {
                CoreError::Database(e)
            }
        })?;

        tx.commit().await?;

        info!(user_id = %user.id, username = %user.username, "Registered user");
        Ok(user)
    }

    /// Check credentials and issue a login token. Returns the raw token.
    pub async fn login(&self, email: &str, password: &str) -> CoreResult<(String, User)> {
        let email = email.trim().to_lowercase();
        let user = self
            .find_user_by_email(&email)
            .await?
            .ok_or(CoreError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            debug!(user_id = %user.id, "Rejected login with wrong password");
            return Err(CoreError::InvalidCredentials);
        }

        let token = generate_token();
        let now = self.clock.now();
        let session = LoginSession {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            token_hash: hash_token(&token),
            expires_at: now + self.session_ttl,
            created_at: now,
        };

        sqlx::query(
            "INSERT INTO login_sessions (id, user_id, token_hash, expires_at, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&session.id)
        .bind(&session.user_id)
        .bind(&session.token_hash)
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.db)
        .await?;

        info!(user_id = %user.id, "User logged in");
        Ok((token, user))
    }

    /// Resolve a login token to its user, if the token is known and unexpired.
    pub async fn is_authenticated(&self, token: &str) -> CoreResult<Option<User>> {
        let session: Option<LoginSession> =
            sqlx::query_as("SELECT * FROM login_sessions WHERE token_hash = ?")
                .bind(hash_token(token))
                .fetch_optional(&self.db)
                .await?;

        let session = match session {
            Some(s) if s.expires_at > self.clock.now() => s,
            _ => return Ok(None),
        };

        self.find_user_by_id(&session.user_id).await
    }

    pub async fn logout(&self, token: &str) -> CoreResult<()> {
        sqlx::query("DELETE FROM login_sessions WHERE token_hash = ?")
            .bind(hash_token(token))
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Drop expired login sessions. Returns how many were removed.
    pub async fn purge_expired(&self) -> CoreResult<u64> {
        // Stored timestamps vary in sub-second digits, so compare as julian days
        let removed = sqlx::query(
            "DELETE FROM login_sessions WHERE julianday(expires_at) <= julianday(?)",
        )
        .bind(self.clock.now())
        .execute(&self.db)
        .await?
        .rows_affected();

        if removed > 0 {
            debug!(removed, "Purged expired login sessions");
        }
        Ok(removed)
    }
}
