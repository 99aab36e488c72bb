use axum::extract::State;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    access::Role,
    auth::AuthUser,
    error::{ApiError, ApiResponse, ApiResult},
    extract::{Json, Path, Query},
    goals,
    models::{AdminStats, Deleted, UpdateRoleRequest, User},
};

const DEFAULT_PAGE: i64 = 50;
const MAX_PAGE: i64 = 200;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct UserListQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// get_admin_stats
///
/// [Admin Route] Profile counts per role plus plan and recommendation totals.
#[utoipa::path(
    get,
    path = "/api/admin/stats",
    responses((status = 200, description = "Stats", body = AdminStats))
)]
pub async fn get_admin_stats(State(state): State<AppState>) -> ApiResult<AdminStats> {
    Ok(ApiResponse::ok(state.repo.get_stats().await?))
}

/// list_users
///
/// [Admin Route] Every profile, oldest first. The raw role column is returned so that broken
/// roles are visible and fixable.
#[utoipa::path(
    get,
    path = "/api/admin/users",
    params(UserListQuery),
    responses((status = 200, description = "Users", body = [User]))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> ApiResult<Vec<User>> {
    let limit = query.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let offset = query.offset.unwrap_or(0).max(0);
    Ok(ApiResponse::ok(state.repo.list_users(limit, offset).await?))
}

/// update_user_role
///
/// [Admin Route] The only way a role changes. Admins cannot change their own role, so the
/// last admin cannot lock everyone out by accident. Existing sessions of the target keep
/// their old role until they sign in again.
#[utoipa::path(
    put,
    path = "/api/admin/users/{id}/role",
    params(("id" = Uuid, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Updated", body = User),
        (status = 400, description = "Own account or unknown role"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_user_role(
    admin: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<User> {
    if id == admin.id {
        return Err(ApiError::validation("You cannot change your own role"));
    }
    let role: Role = payload
        .role
        .parse()
        .map_err(|_| ApiError::validation(format!("Unknown role: {}", payload.role)))?;

    let updated = state
        .repo
        .set_user_role(id, role)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::info!(admin = %admin.id, user = %id, role = %role, "role changed");
    Ok(ApiResponse::ok(updated))
}

/// delete_user
///
/// [Admin Route] Removes the profile (plans and recommendations cascade), then everything the
/// document store holds for it in one batch.
#[utoipa::path(
    delete,
    path = "/api/admin/users/{id}",
    params(("id" = Uuid, Path, description = "User ID")),
    responses(
        (status = 200, description = "Deleted", body = Deleted),
        (status = 400, description = "Own account"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_user(
    admin: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Deleted> {
    if id == admin.id {
        return Err(ApiError::validation("You cannot delete your own account"));
    }
    if !state.repo.delete_user(id).await? {
        return Err(ApiError::not_found("User not found"));
    }

    goals::purge_user(state.docs.as_ref(), id).await?;
    tracing::info!(admin = %admin.id, user = %id, "user deleted");
    Ok(ApiResponse::ok(Deleted { id }))
}
