use std::sync::Arc;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use chrono::{DateTime, Utc};
use kernel::Role;
use uuid::Uuid;

use crate::config::Config;
use crate::domain::Storage;
use crate::error::{ApiError, AuthFailure};
use crate::password::SecretHasher;
use crate::sqlite::{execute, Mode};
use crate::AppState;

pub const SESSION_COOKIE: &str = "filebox_session";
const FALLBACK_TTL_HOURS: i64 = 24;

/// Authenticated user context attached to a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
    pub role: Role,
    pub session_id: String,
}

impl Identity {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Registers a regular user account.
pub async fn register(state: &AppState, email: &str, password: &str) -> Result<i64, ApiError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ApiError::Validation("email is required".to_owned()));
    }
    if password.is_empty() {
        return Err(ApiError::Validation("password is required".to_owned()));
    }
    let digest = hash_password(&state.hasher, password).await?;

    execute(&state.config.db, Mode::ReadWrite, |mut repository| {
        match repository.create_user(email, &digest, Role::User)? {
            Some(id) => {
                tracing::info!("user {email} registered with id {id}");
                Ok(id)
            }
            None => Err(ApiError::DuplicateEmail),
        }
    })
}

/// Verifies credentials and opens a new session. Returns the session id.
///
/// Expired sessions of every user are purged on the way.
pub async fn login(state: &AppState, email: &str, password: &str) -> Result<String, ApiError> {
    let user = execute(&state.config.db, Mode::ReadOnly, |repository| {
        Ok(repository.find_user_by_email(email.trim())?)
    })?;
    let Some(user) = user else {
        tracing::info!("login refused for {email}: unknown user");
        return Err(ApiError::AuthFailure(AuthFailure::UserNotFound));
    };
    if !verify_password(&state.hasher, password, &user.password_hash).await? {
        tracing::info!("login refused for {email}: wrong password");
        return Err(ApiError::AuthFailure(AuthFailure::WrongPassword));
    }

    let session_id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let expires_at = expiry(&state.config, now);
    execute(&state.config.db, Mode::ReadWrite, |mut repository| {
        let purged = repository.purge_sessions(now)?;
        if purged > 0 {
            tracing::debug!("{purged} expired sessions removed");
        }
        Ok(repository.create_session(&session_id, user.id, expires_at)?)
    })?;
    tracing::info!("user {} logged in", user.email);
    Ok(session_id)
}

/// Invalidates a session. Unknown ids are ignored.
pub fn logout(state: &AppState, session_id: &str) -> Result<(), ApiError> {
    let removed = execute(&state.config.db, Mode::ReadWrite, |mut repository| {
        Ok(repository.delete_session(session_id)?)
    })?;
    if removed > 0 {
        tracing::info!("session closed");
    }
    Ok(())
}

/// Resolves a session id into the identity it belongs to, sliding its expiry.
pub fn resolve(state: &AppState, session_id: &str) -> Result<Identity, ApiError> {
    let now = Utc::now();
    execute(&state.config.db, Mode::ReadWrite, |mut repository| {
        let Some(session) = repository.find_session(session_id)? else {
            return Err(ApiError::Unauthenticated);
        };
        if session.expires_at <= now {
            repository.delete_session(session_id)?;
            tracing::debug!("session of user {} expired", session.user_id);
            return Err(ApiError::Unauthenticated);
        }
        let Some(user) = repository.find_user_by_id(session.user_id)? else {
            repository.delete_session(session_id)?;
            return Err(ApiError::Unauthenticated);
        };
        repository.touch_session(session_id, expiry(&state.config, now))?;
        Ok(Identity {
            user_id: user.id,
            email: user.email,
            role: user.role,
            session_id: session.id,
        })
    })
}

/// Makes sure the configured admin account exists and holds the admin role.
///
/// Must run before the listener accepts traffic. Safe to run on every start.
pub fn bootstrap_admin(config: &Config, hasher: &dyn SecretHasher) -> Result<i64, ApiError> {
    execute(&config.db, Mode::ReadWrite, |mut repository| {
        if let Some(user) = repository.find_user_by_email(&config.admin_email)? {
            if user.role != Role::Admin {
                tracing::warn!("promoting existing user {} to admin", user.email);
                repository.set_role(user.id, Role::Admin)?;
            }
            return Ok(user.id);
        }
        let digest = hasher
            .hash(&config.admin_password)
            .map_err(ApiError::Internal)?;
        match repository.create_user(&config.admin_email, &digest, Role::Admin)? {
            Some(id) => {
                tracing::info!("admin account {} created", config.admin_email);
                Ok(id)
            }
            None => repository
                .find_user_by_email(&config.admin_email)?
                .map(|u| u.id)
                .ok_or_else(|| ApiError::Internal("admin account vanished".to_owned())),
        }
    })
}

/// Removes sessions that expired while the server was down.
pub fn purge_expired_sessions(config: &Config) -> Result<usize, ApiError> {
    execute(&config.db, Mode::ReadWrite, |mut repository| {
        Ok(repository.purge_sessions(Utc::now())?)
    })
}

#[must_use]
pub fn session_cookie(session_id: String, config: &Config) -> Cookie<'static> {
    let max_age = i64::try_from(config.session_ttl.as_secs()).unwrap_or(i64::MAX);
    Cookie::build((SESSION_COOKIE, session_id))
        .http_only(true)
        .secure(config.secure_cookies)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::seconds(max_age))
        .path("/")
        .build()
}

#[must_use]
pub fn removal_cookie() -> Cookie<'static> {
    Cookie::build(SESSION_COOKIE).path("/").build()
}

fn expiry(config: &Config, now: DateTime<Utc>) -> DateTime<Utc> {
    chrono::Duration::from_std(config.session_ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or_else(|| {
            tracing::warn!(
                "session ttl {:?} out of range, using {FALLBACK_TTL_HOURS}h",
                config.session_ttl
            );
            now + chrono::Duration::hours(FALLBACK_TTL_HOURS)
        })
}

async fn hash_password(
    hasher: &Arc<dyn SecretHasher>,
    password: &str,
) -> Result<String, ApiError> {
    let hasher = Arc::clone(hasher);
    let password = password.to_owned();
    tokio::task::spawn_blocking(move || hasher.hash(&password))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .map_err(ApiError::Internal)
}

async fn verify_password(
    hasher: &Arc<dyn SecretHasher>,
    password: &str,
    digest: &str,
) -> Result<bool, ApiError> {
    let hasher = Arc::clone(hasher);
    let password = password.to_owned();
    let digest = digest.to_owned();
    tokio::task::spawn_blocking(move || hasher.verify(&password, &digest))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))
}

#[async_trait]
impl FromRequestParts<AppState> for Identity {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let Some(cookie) = jar.get(SESSION_COOKIE) else {
            return Err(ApiError::Unauthenticated);
        };
        resolve(state, cookie.value())
    }
}
