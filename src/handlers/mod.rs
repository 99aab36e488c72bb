//! Route handlers, grouped by who can reach them.
//!
//! Role checks happen in the guard layers (see `routes`); handlers only enforce ownership and
//! same-school rules, and validate input.

pub mod admin;
pub mod auth;
pub mod goals;
pub mod leaderboard;
pub mod pages;
pub mod session;
pub mod student;
pub mod teacher;

use crate::{AppState, access::Role, auth::AuthUser, error::ApiError, models::User};

/// current_profile
///
/// Loads the caller's profile row. The session only caches identity, so anything that needs
/// school/class (goals, feeds, rankings) reads the profile.
pub(crate) async fn current_profile(state: &AppState, user: &AuthUser) -> Result<User, ApiError> {
    state
        .repo
        .get_user(user.id)
        .await?
        .ok_or_else(|| ApiError::not_found("Profile not found"))
}

/// The stored role, falling back to the session's when the column holds something unknown.
pub(crate) fn profile_role(profile: &User, session_role: Role) -> Role {
    profile.parsed_role().unwrap_or(session_role)
}

pub(crate) fn required(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(value.to_string())
}
