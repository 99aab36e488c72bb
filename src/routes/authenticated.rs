use crate::{
    AppState,
    access::Access,
    handlers::{goals, leaderboard, session},
};
use axum::{
    Router,
    routing::{get, post},
};

use super::with_api_guard;

/// Authenticated Router Module
///
/// Routes open to any valid role. Handlers still enforce Owner-Only rules on goals.
pub fn authenticated_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new()
        // GET /api/me
        .route("/api/me", get(session::get_me))
        // --- Leaderboard ---
        // GET /api/leaderboard?school=&className=&limit=&offset=
        .route("/api/leaderboard", get(leaderboard::get_leaderboard))
        .route("/api/leaderboard/me", get(leaderboard::get_my_rank))
        // --- Daily Goals ---
        .route("/api/goals", get(goals::list_goals).post(goals::create_goal))
        // GET /api/goals/feed
        // Today's goals of the caller's class.
        .route("/api/goals/feed", get(goals::class_feed))
        // POST /api/goals/{id}/complete
        // Goal status and leaderboard points change in one batch.
        .route("/api/goals/{id}/complete", post(goals::complete_goal))
        .route("/api/goals/{id}/cheer", post(goals::cheer_goal))
        .route("/api/goals/{id}", axum::routing::delete(goals::delete_goal));

    with_api_guard(router, state, Access::authenticated())
}
