use crate::{
    AppState,
    access::{Access, Role},
    handlers::teacher,
};
use axum::{
    Router,
    routing::{get, post},
};

use super::with_api_guard;

/// Teacher Router Module
///
/// Class oversight. Same-school checks are done per request in the handlers.
pub fn teacher_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new()
        .route("/api/teacher/students", get(teacher::list_students))
        .route(
            "/api/teacher/students/{id}/study-plans",
            get(teacher::student_study_plans),
        )
        .route(
            "/api/teacher/students/{id}/recommendations",
            post(teacher::add_recommendation),
        );

    with_api_guard(router, state, Access::roles(&[Role::Teacher]))
}
