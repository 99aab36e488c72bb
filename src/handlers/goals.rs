use axum::{extract::State, http::StatusCode};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiError, ApiResponse, ApiResult},
    extract::{Json, Path, Query},
    goals,
    models::{CreateGoalRequest, DailyGoal, Deleted},
};

use super::current_profile;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
pub struct GoalListQuery {
    /// YYYY-MM-DD. Omitted means every day.
    pub date: Option<String>,
}

/// list_goals
///
/// [Authenticated Route] The caller's goals, newest first.
#[utoipa::path(
    get,
    path = "/api/goals",
    params(GoalListQuery),
    responses((status = 200, description = "My goals", body = [DailyGoal]))
)]
pub async fn list_goals(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Query(query): Query<GoalListQuery>,
) -> ApiResult<Vec<DailyGoal>> {
    if let Some(date) = &query.date {
        date.parse::<chrono::NaiveDate>()
            .map_err(|_| ApiError::validation("date must be YYYY-MM-DD"))?;
    }
    let list = goals::list_for_user(state.docs.as_ref(), id, query.date.as_deref()).await?;
    Ok(ApiResponse::ok(list))
}

/// create_goal
///
/// [Authenticated Route] Adds a goal for today, tagged with the caller's school and class so
/// it shows up in the class feed.
#[utoipa::path(
    post,
    path = "/api/goals",
    request_body = CreateGoalRequest,
    responses(
        (status = 201, description = "Created", body = DailyGoal),
        (status = 400, description = "Invalid title or daily limit reached")
    )
)]
pub async fn create_goal(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateGoalRequest>,
) -> Result<(StatusCode, ApiResponse<DailyGoal>), ApiError> {
    let profile = current_profile(&state, &user).await?;
    let goal = goals::create(state.docs.as_ref(), &profile, &payload.title).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(goal)))
}

/// class_feed
///
/// [Authenticated Route] Today's goals from the caller's class.
#[utoipa::path(
    get,
    path = "/api/goals/feed",
    responses((status = 200, description = "Class feed", body = [DailyGoal]))
)]
pub async fn class_feed(user: AuthUser, State(state): State<AppState>) -> ApiResult<Vec<DailyGoal>> {
    let profile = current_profile(&state, &user).await?;
    Ok(ApiResponse::ok(
        goals::class_feed(state.docs.as_ref(), &profile).await?,
    ))
}

/// complete_goal
///
/// [Authenticated Route] Owner-Only. Awards the points together with the status change.
#[utoipa::path(
    post,
    path = "/api/goals/{id}/complete",
    params(("id" = Uuid, Path, description = "Goal ID")),
    responses(
        (status = 200, description = "Completed", body = DailyGoal),
        (status = 400, description = "Already completed"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn complete_goal(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<DailyGoal> {
    let profile = current_profile(&state, &user).await?;
    Ok(ApiResponse::ok(
        goals::complete(state.docs.as_ref(), id, &profile).await?,
    ))
}

/// cheer_goal
///
/// [Authenticated Route] Once per goal, never on one's own.
#[utoipa::path(
    post,
    path = "/api/goals/{id}/cheer",
    params(("id" = Uuid, Path, description = "Goal ID")),
    responses(
        (status = 200, description = "Cheered", body = DailyGoal),
        (status = 400, description = "Own goal or already cheered"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn cheer_goal(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<DailyGoal> {
    Ok(ApiResponse::ok(
        goals::cheer(state.docs.as_ref(), id, &user).await?,
    ))
}

/// delete_goal
///
/// [Authenticated Route] Removes the goal and its cheers together.
#[utoipa::path(
    delete,
    path = "/api/goals/{id}",
    params(("id" = Uuid, Path, description = "Goal ID")),
    responses(
        (status = 200, description = "Deleted", body = Deleted),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_goal(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Deleted> {
    goals::delete(state.docs.as_ref(), id, &user).await?;
    Ok(ApiResponse::ok(Deleted { id }))
}
