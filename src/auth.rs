use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts},
};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use tower_cookies::cookie::{Cookie, SameSite, time::Duration as CookieDuration};
use uuid::Uuid;

use crate::{
    access::{Access, Policy, Role, Verdict},
    config::{AppConfig, Env},
    error::ApiError,
    models::User,
    repository::RepositoryState,
};

/// Name of the cookie that carries the session token for page requests.
pub const SESSION_COOKIE: &str = "studyhub_session";

/// Header accepted in `Env::Local` to act as an existing profile without a token.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// Claims
///
/// Payload of a session token. `role` is the profile's role at sign-in time; it is a cache and
/// can go stale until the user signs in again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the profile id.
    pub sub: Uuid,
    pub name: String,
    pub email: String,
    /// Absent or unrecognised roles are rejected by the policy, never defaulted.
    #[serde(default)]
    pub role: Option<String>,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSource {
    Bearer,
    Cookie,
    DevBypass,
}

/// Session
///
/// A validated, unexpired session as seen by the guards.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Option<String>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub source: SessionSource,
}

impl Session {
    fn from_claims(claims: Claims, source: SessionSource) -> Self {
        Self {
            user_id: claims.sub,
            name: claims.name,
            email: claims.email,
            role: claims.role,
            issued_at: timestamp(claims.iat),
            expires_at: timestamp(claims.exp),
            source,
        }
    }

    fn from_user(user: User, ttl_secs: i64) -> Self {
        let now = Utc::now();
        Self {
            user_id: user.id,
            name: user.name,
            email: user.email,
            role: Some(user.role),
            issued_at: now,
            expires_at: now + chrono::Duration::seconds(ttl_secs),
            source: SessionSource::DevBypass,
        }
    }
}

fn timestamp(secs: usize) -> DateTime<Utc> {
    DateTime::from_timestamp(secs as i64, 0).unwrap_or_default()
}

/// SessionState
///
/// What a guard knows about the caller. Server-side resolution always finishes with
/// `Anonymous` or `Authenticated`; `Loading` only exists for the render guard, whose
/// session arrives asynchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    Loading,
    Anonymous,
    Authenticated(Session),
}

impl SessionState {
    pub fn session(&self) -> Option<&Session> {
        match self {
            SessionState::Authenticated(session) => Some(session),
            _ => None,
        }
    }
}

// --- Tokens ---

/// issue_token
///
/// Signs a fresh session token for a profile.
pub fn issue_token(user: &User, config: &AppConfig) -> Result<(String, Claims), ApiError> {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: user.id,
        name: user.name.clone(),
        email: user.email.clone(),
        role: Some(user.role.clone()),
        iat: now,
        exp: now + config.session_ttl_secs as usize,
    };
    let token = sign(&claims, config)?;
    Ok((token, claims))
}

/// refresh_token
///
/// Re-signs an existing session with a new expiry. Identity and role are carried over
/// unchanged.
pub fn refresh_token(session: &Session, config: &AppConfig) -> Result<String, ApiError> {
    let now = Utc::now().timestamp() as usize;
    let claims = Claims {
        sub: session.user_id,
        name: session.name.clone(),
        email: session.email.clone(),
        role: session.role.clone(),
        iat: now,
        exp: now + config.session_ttl_secs as usize,
    };
    sign(&claims, config)
}

fn sign(claims: &Claims, config: &AppConfig) -> Result<String, ApiError> {
    let key = EncodingKey::from_secret(config.jwt_secret.as_bytes());
    encode(&Header::default(), claims, &key)
        .map_err(|e| ApiError::Internal(format!("token signing failed: {e}")))
}

/// decode_token
///
/// Verifies signature and expiry. Any failure means "no session".
pub fn decode_token(token: &str, config: &AppConfig) -> Option<Claims> {
    let key = DecodingKey::from_secret(config.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.validate_exp = true;

    match decode::<Claims>(token, &key, &validation) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            tracing::debug!("Rejected session token: {:?}", e.kind());
            None
        }
    }
}

// --- Cookies ---

pub fn session_cookie(token: String, config: &AppConfig) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(config.env == Env::Production)
        .max_age(CookieDuration::seconds(config.session_ttl_secs))
        .build()
}

pub fn clear_session_cookie() -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, ""))
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::ZERO)
        .build()
}

fn bearer_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
}

fn cookie_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|raw| Cookie::split_parse(raw.to_string()))
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_string())
}

// --- Resolution ---

/// resolve_session
///
/// Works out who is calling:
/// 1. Local bypass: in `Env::Local`, an `x-user-id` header naming an existing profile.
/// 2. `Authorization: Bearer <token>`.
/// 3. The session cookie.
///
/// A bad token never falls back to another source; it resolves to `Anonymous`, as does a
/// valid token whose profile no longer exists.
pub async fn resolve_session(
    parts: &Parts,
    repo: &RepositoryState,
    config: &AppConfig,
) -> SessionState {
    if config.env == Env::Local {
        if let Some(user_id) = parts
            .headers
            .get(DEV_USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok())
        {
            match repo.get_user(user_id).await {
                Ok(Some(user)) => {
                    return SessionState::Authenticated(Session::from_user(
                        user,
                        config.session_ttl_secs,
                    ));
                }
                Ok(None) => tracing::debug!("Dev bypass: no profile {}", user_id),
                Err(e) => tracing::warn!("Dev bypass lookup failed: {:?}", e),
            }
        }
    }

    let (token, source) = match bearer_token(parts) {
        Some(token) => (token, SessionSource::Bearer),
        None => match cookie_token(parts) {
            Some(token) => (token, SessionSource::Cookie),
            None => return SessionState::Anonymous,
        },
    };

    let Some(claims) = decode_token(&token, config) else {
        return SessionState::Anonymous;
    };

    // A token outlives its profile; a deleted account must not keep a session alive.
    // The role stays as issued.
    match repo.get_user(claims.sub).await {
        Ok(Some(_)) => SessionState::Authenticated(Session::from_claims(claims, source)),
        Ok(None) => {
            tracing::debug!("Session for deleted profile {}", claims.sub);
            SessionState::Anonymous
        }
        Err(e) => {
            tracing::warn!("Session profile lookup failed: {:?}", e);
            SessionState::Anonymous
        }
    }
}

/// SessionState Extractor
///
/// Reuses the state a guard already resolved for this request, otherwise resolves it.
impl<S> FromRequestParts<S> for SessionState
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(resolved) = parts.extensions.get::<SessionState>() {
            return Ok(resolved.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);
        let resolved = resolve_session(parts, &repo, &config).await;
        parts.extensions.insert(resolved.clone());
        Ok(resolved)
    }
}

/// AuthUser
///
/// The resolved identity of an authorized request, as handlers see it.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
}

impl AuthUser {
    pub fn from_session(session: &Session, role: Role) -> Self {
        Self {
            id: session.user_id,
            name: session.name.clone(),
            email: session.email.clone(),
            role,
        }
    }
}

/// AuthUser Extractor
///
/// Inside a guarded router the API guard has already stored the `AuthUser`, so the check is
/// not repeated. Elsewhere it falls back to evaluating "any authenticated role":
/// 401 without a session, 403 for a missing or unrecognised role.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let config = AppConfig::from_ref(state);
        let session_state = match SessionState::from_request_parts(parts, state).await {
            Ok(resolved) => resolved,
            Err(never) => match never {},
        };

        let policy = Policy::new(config.admin_override);
        match policy.evaluate(&session_state, &Access::authenticated()) {
            Verdict::Allowed(role) => {
                let session = session_state.session().ok_or(ApiError::Unauthenticated)?;
                let user = AuthUser::from_session(session, role);
                parts.extensions.insert(user.clone());
                Ok(user)
            }
            Verdict::Denied(reason) => Err(ApiError::Forbidden(reason.message())),
            Verdict::Pending | Verdict::Unauthenticated => Err(ApiError::Unauthenticated),
        }
    }
}
