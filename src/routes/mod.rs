//! Router modules, one per audience. Each protected module declares its allow-list once, on
//! the guard layer that wraps all of its routes, so no handler can be exposed without a check.

use axum::{Router, middleware};

use crate::{
    AppState,
    access::Access,
    guard::{GuardState, api_guard, page_guard},
};

/// Open to everyone: health, sign-in/up/out, session introspection.
pub mod public;

/// Server-rendered pages behind the page guard (redirects).
pub mod pages;

/// API routes for any authenticated role.
pub mod authenticated;

/// Student-only API routes.
pub mod student;

/// Teacher-only API routes.
pub mod teacher;

/// Admin-only API routes.
pub mod admin;

/// Wraps an API router in the API guard with the given allow-list.
pub(crate) fn with_api_guard(
    router: Router<AppState>,
    state: &AppState,
    access: Access,
) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        GuardState::new(state.clone(), access),
        api_guard,
    ))
}

/// Wraps a page router in the page guard with the given allow-list.
pub(crate) fn with_page_guard(
    router: Router<AppState>,
    state: &AppState,
    access: Access,
) -> Router<AppState> {
    router.route_layer(middleware::from_fn_with_state(
        GuardState::new(state.clone(), access),
        page_guard,
    ))
}
