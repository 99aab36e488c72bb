use crate::{
    AppState,
    access::{Access, Role},
    handlers::student,
};
use axum::{
    Router,
    routing::{get, post},
};

use super::with_api_guard;

/// Student Router Module
///
/// Study plans and recommendations of the caller.
pub fn student_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new()
        .route(
            "/api/study-plans",
            get(student::list_study_plans).post(student::create_study_plan),
        )
        // GET/PUT/DELETE /api/study-plans/{id}
        // Owner-Only; another student's plan is a 404.
        .route(
            "/api/study-plans/{id}",
            get(student::get_study_plan)
                .put(student::update_study_plan)
                .delete(student::delete_study_plan),
        )
        .route("/api/recommendations", get(student::list_recommendations))
        // POST /api/recommendations/generate
        // Calls the external recommendation engine.
        .route(
            "/api/recommendations/generate",
            post(student::generate_recommendations),
        );

    with_api_guard(router, state, Access::roles(&[Role::Student]))
}
