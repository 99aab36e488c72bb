use crate::{
    AppState,
    access::{Access, Role},
    handlers::pages,
};
use axum::{
    Router,
    routing::{MethodRouter, get},
};

use super::with_page_guard;

fn guarded(
    state: &AppState,
    path: &str,
    handler: MethodRouter<AppState>,
    access: Access,
) -> Router<AppState> {
    with_page_guard(Router::new().route(path, handler), state, access)
}

/// Page Router Module
///
/// Each page carries its own allow-list. Denials never reach the handler; the page guard
/// answers with a redirect instead (sign-in, or `/dashboard` for a role mismatch).
pub fn page_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .merge(guarded(state, "/dashboard", get(pages::dashboard), Access::authenticated()))
        .merge(guarded(state, "/student", get(pages::student_home), Access::roles(&[Role::Student])))
        .merge(guarded(state, "/teacher", get(pages::teacher_home), Access::roles(&[Role::Teacher])))
        .merge(guarded(state, "/admin", get(pages::admin_home), Access::roles(&[Role::Admin])))
        .merge(guarded(
            state,
            "/leaderboard",
            get(pages::leaderboard_page),
            Access::authenticated(),
        ))
}
