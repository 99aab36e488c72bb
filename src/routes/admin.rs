use crate::{
    AppState,
    access::{Access, Role},
    handlers::admin,
};
use axum::{
    Router,
    routing::{get, put},
};

use super::with_api_guard;

/// Admin Router Module
///
/// User management and statistics. Role changes happen here and nowhere else.
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    let router = Router::new()
        // GET /api/admin/stats
        .route("/api/admin/stats", get(admin::get_admin_stats))
        .route("/api/admin/users", get(admin::list_users))
        // PUT /api/admin/users/{id}/role
        // 400 on the caller's own account or an unknown role.
        .route("/api/admin/users/{id}/role", put(admin::update_user_role))
        // DELETE /api/admin/users/{id}
        // Relational rows cascade; documents are purged in one batch.
        .route(
            "/api/admin/users/{id}",
            axum::routing::delete(admin::delete_user),
        );

    with_api_guard(router, state, Access::roles(&[Role::Admin]))
}
