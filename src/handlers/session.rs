use axum::extract::State;
use serde::Deserialize;

use crate::{
    AppState,
    access::{Access, Role},
    auth::{AuthUser, SessionState},
    error::{ApiError, ApiResponse, ApiResult},
    extract::Query,
    guard::{RenderGuard, RenderOutcome},
    models::{GateView, SessionUser, SessionView, UserProfile},
};

use super::{current_profile, profile_role};

/// get_session
///
/// [Public Route] Reports the current session without requiring one.
#[utoipa::path(
    get,
    path = "/api/session",
    responses((status = 200, description = "Session state", body = SessionView))
)]
pub async fn get_session(session: SessionState) -> ApiResult<SessionView> {
    let view = match session.session() {
        Some(s) => SessionView {
            status: "authenticated".to_string(),
            user: Some(SessionUser {
                id: s.user_id,
                name: s.name.clone(),
                email: s.email.clone(),
                role: s.role.clone(),
            }),
            expires: Some(s.expires_at),
        },
        None => SessionView {
            status: "unauthenticated".to_string(),
            user: None,
            expires: None,
        },
    };
    Ok(ApiResponse::ok(view))
}

/// GateQuery
///
/// `roles` is a comma-separated allow-list; omitted or empty means any authenticated role.
#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct GateQuery {
    pub path: String,
    pub roles: Option<String>,
}

pub fn parse_roles(raw: Option<&str>) -> Result<Access, ApiError> {
    let roles = raw
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(|r| {
            r.parse::<Role>()
                .map_err(|e| ApiError::validation(e.to_string()))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(if roles.is_empty() {
        Access::authenticated()
    } else {
        Access::roles(&roles)
    })
}

/// session_gate
///
/// [Public Route] Runs the render guard for a client-rendered page: whether to show the
/// protected content, keep the loading indicator or navigate away.
#[utoipa::path(
    get,
    path = "/api/session/gate",
    params(GateQuery),
    responses(
        (status = 200, description = "Gate outcome", body = GateView),
        (status = 400, description = "Unknown role in the allow-list")
    )
)]
pub async fn session_gate(
    State(state): State<AppState>,
    session: SessionState,
    Query(query): Query<GateQuery>,
) -> ApiResult<GateView> {
    let access = parse_roles(query.roles.as_deref())?;
    let mut gate = RenderGuard::new(access, query.path, &state.config);

    let view = match gate.observe(&session) {
        RenderOutcome::Render | RenderOutcome::Unchanged => GateView {
            outcome: "render".to_string(),
            location: None,
        },
        RenderOutcome::Loading => GateView {
            outcome: "loading".to_string(),
            location: None,
        },
        RenderOutcome::Redirect(location) => GateView {
            outcome: "redirect".to_string(),
            location: Some(location),
        },
    };
    Ok(ApiResponse::ok(view))
}

/// get_me
///
/// [Authenticated Route] The caller's profile as stored, including school and class.
#[utoipa::path(
    get,
    path = "/api/me",
    responses(
        (status = 200, description = "Profile", body = UserProfile),
        (status = 401, description = "No session")
    )
)]
pub async fn get_me(user: AuthUser, State(state): State<AppState>) -> ApiResult<UserProfile> {
    let profile = current_profile(&state, &user).await?;
    let role = profile_role(&profile, user.role);
    Ok(ApiResponse::ok(UserProfile::new(profile, role)))
}
