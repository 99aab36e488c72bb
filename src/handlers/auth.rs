use axum::{extract::State, http::StatusCode};
use chrono::{DateTime, Utc};
use serde_json::{Value, json};
use tower_cookies::Cookies;

use crate::{
    AppState,
    access::Role,
    auth::{self, SessionState},
    error::{ApiError, ApiResponse, ApiResult},
    extract::Json,
    models::{AuthResponse, SignInRequest, SignUpRequest, User, UserProfile},
};

use super::required;

const MIN_PASSWORD_LEN: usize = 6;

fn normalize_email(email: &str) -> Result<String, ApiError> {
    let email = required("email", email)?.to_lowercase();
    if !email.contains('@') {
        return Err(ApiError::validation("email is not valid"));
    }
    Ok(email)
}

/// Signs a session for `user`, sets the cookie and builds the response body.
fn start_session(
    user: User,
    state: &AppState,
    cookies: &Cookies,
) -> Result<AuthResponse, ApiError> {
    let role = user
        .parsed_role()
        .map_err(|e| ApiError::forbidden(format!("Account has an invalid role: {}", e.0)))?;
    let (token, claims) = auth::issue_token(&user, &state.config)?;
    cookies.add(auth::session_cookie(token.clone(), &state.config));

    Ok(AuthResponse {
        token,
        user: UserProfile::new(user, role),
        expires: DateTime::from_timestamp(claims.exp as i64, 0).unwrap_or_default(),
    })
}

/// sign_up
///
/// [Public Route] Creates the account at the auth provider, then the local profile under the
/// provider's id. Self-registration always yields a student; other roles are granted by an
/// admin.
#[utoipa::path(
    post,
    path = "/api/auth/signup",
    request_body = SignUpRequest,
    responses(
        (status = 201, description = "Registered and signed in", body = AuthResponse),
        (status = 400, description = "Invalid input or rejected by the auth provider"),
        (status = 409, description = "Email already registered")
    )
)]
pub async fn sign_up(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<SignUpRequest>,
) -> Result<(StatusCode, ApiResponse<AuthResponse>), ApiError> {
    let name = required("name", &payload.name)?;
    let email = normalize_email(&payload.email)?;
    if payload.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::validation(format!(
            "password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if state.repo.get_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict("Email already registered".to_string()));
    }

    let id = state.auth.sign_up(&email, &payload.password).await?;

    let user = state
        .repo
        .create_user(User {
            id,
            name,
            email,
            role: Role::Student.as_str().to_string(),
            school: payload.school.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            class_name: payload
                .class_name
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
            created_at: Utc::now(),
        })
        .await?;

    tracing::info!(user = %user.id, "registered new student");
    let body = start_session(user, &state, &cookies)?;
    Ok((StatusCode::CREATED, ApiResponse::ok(body)))
}

/// sign_in
///
/// [Public Route] Verifies credentials with the auth provider and opens a session for the
/// matching profile.
#[utoipa::path(
    post,
    path = "/api/auth/signin",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = AuthResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    cookies: Cookies,
    Json(payload): Json<SignInRequest>,
) -> ApiResult<AuthResponse> {
    let email = normalize_email(&payload.email)?;
    let id = state.auth.sign_in(&email, &payload.password).await?;

    let Some(user) = state.repo.get_user(id).await? else {
        // Provider account without a local profile.
        tracing::warn!(user = %id, "sign-in for unknown profile");
        return Err(ApiError::Unauthenticated);
    };

    tracing::info!(user = %user.id, role = %user.role, "signed in");
    Ok(ApiResponse::ok(start_session(user, &state, &cookies)?))
}

/// sign_out
///
/// [Public Route] Clears the session cookie. Bearer tokens simply expire.
#[utoipa::path(
    post,
    path = "/api/auth/signout",
    responses((status = 200, description = "Signed out"))
)]
pub async fn sign_out(session: SessionState, cookies: Cookies) -> ApiResult<Value> {
    if let Some(s) = session.session() {
        tracing::info!(user = %s.user_id, "signed out");
    }
    cookies.add(auth::clear_session_cookie());
    Ok(ApiResponse::ok(json!({ "signedOut": true })))
}
