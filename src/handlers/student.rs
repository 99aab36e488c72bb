//! Student area: own study plans and recommendations.

use axum::{extract::State, http::StatusCode};
use uuid::Uuid;

use crate::{
    AppState,
    auth::AuthUser,
    documents,
    error::{ApiError, ApiResponse, ApiResult},
    extract::{Json, Path},
    leaderboard::LEADERBOARD,
    models::{
        self, CreateStudyPlanRequest, Deleted, LeaderboardEntry, Recommendation, StudyPlan,
        UpdateStudyPlanRequest,
    },
    recommend::StudentContext,
};

use super::{current_profile, required};

/// Most recent recommendations returned by the list endpoint.
const RECOMMENDATION_LIST_LIMIT: i64 = 50;

fn validate_update(payload: &mut UpdateStudyPlanRequest) -> Result<(), ApiError> {
    payload.title = payload
        .title
        .as_deref()
        .map(|t| required("title", t))
        .transpose()?;
    payload.subject = payload
        .subject
        .as_deref()
        .map(|s| required("subject", s))
        .transpose()?;
    if let Some(progress) = payload.progress {
        if !(0..=100).contains(&progress) {
            return Err(ApiError::validation("progress must be between 0 and 100"));
        }
    }
    Ok(())
}

/// list_study_plans
///
/// [Student Route] The caller's plans, newest first.
#[utoipa::path(
    get,
    path = "/api/study-plans",
    responses((status = 200, description = "My study plans", body = [StudyPlan]))
)]
pub async fn list_study_plans(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Vec<StudyPlan>> {
    Ok(ApiResponse::ok(state.repo.list_study_plans(id).await?))
}

/// create_study_plan
///
/// [Student Route] Starts a plan at 0% progress, status `active`.
#[utoipa::path(
    post,
    path = "/api/study-plans",
    request_body = CreateStudyPlanRequest,
    responses(
        (status = 201, description = "Created", body = StudyPlan),
        (status = 400, description = "Missing title or subject")
    )
)]
pub async fn create_study_plan(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
    Json(mut payload): Json<CreateStudyPlanRequest>,
) -> Result<(StatusCode, ApiResponse<StudyPlan>), ApiError> {
    payload.title = required("title", &payload.title)?;
    payload.subject = required("subject", &payload.subject)?;

    let plan = state.repo.create_study_plan(id, payload).await?;
    Ok((StatusCode::CREATED, ApiResponse::ok(plan)))
}

/// get_study_plan
///
/// [Student Route] Owner-Only. Someone else's plan is reported as missing.
#[utoipa::path(
    get,
    path = "/api/study-plans/{id}",
    params(("id" = Uuid, Path, description = "Study plan ID")),
    responses(
        (status = 200, description = "Found", body = StudyPlan),
        (status = 404, description = "Not Found")
    )
)]
pub async fn get_study_plan(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<StudyPlan> {
    match state.repo.get_study_plan(id).await? {
        Some(plan) if plan.user_id == user_id => Ok(ApiResponse::ok(plan)),
        _ => Err(ApiError::not_found("Study plan not found")),
    }
}

/// update_study_plan
///
/// [Student Route] Partial update, Owner-Only.
#[utoipa::path(
    put,
    path = "/api/study-plans/{id}",
    params(("id" = Uuid, Path, description = "Study plan ID")),
    request_body = UpdateStudyPlanRequest,
    responses(
        (status = 200, description = "Updated", body = StudyPlan),
        (status = 400, description = "Invalid field"),
        (status = 404, description = "Not Found")
    )
)]
pub async fn update_study_plan(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateStudyPlanRequest>,
) -> ApiResult<StudyPlan> {
    validate_update(&mut payload)?;
    state
        .repo
        .update_study_plan(id, user_id, payload)
        .await?
        .map(ApiResponse::ok)
        .ok_or_else(|| ApiError::not_found("Study plan not found"))
}

/// delete_study_plan
///
/// [Student Route] Owner-Only.
#[utoipa::path(
    delete,
    path = "/api/study-plans/{id}",
    params(("id" = Uuid, Path, description = "Study plan ID")),
    responses(
        (status = 200, description = "Deleted", body = Deleted),
        (status = 404, description = "Not Found")
    )
)]
pub async fn delete_study_plan(
    AuthUser { id: user_id, .. }: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Deleted> {
    if state.repo.delete_study_plan(id, user_id).await? {
        Ok(ApiResponse::ok(Deleted { id }))
    } else {
        Err(ApiError::not_found("Study plan not found"))
    }
}

/// list_recommendations
///
/// [Student Route] AI and teacher suggestions for the caller, newest first.
#[utoipa::path(
    get,
    path = "/api/recommendations",
    responses((status = 200, description = "My recommendations", body = [Recommendation]))
)]
pub async fn list_recommendations(
    AuthUser { id, .. }: AuthUser,
    State(state): State<AppState>,
) -> ApiResult<Vec<Recommendation>> {
    let list = state
        .repo
        .list_recommendations(id, RECOMMENDATION_LIST_LIMIT)
        .await?;
    Ok(ApiResponse::ok(list))
}

/// generate_recommendations
///
/// [Student Route] Asks the recommendation engine about the caller's plans and goal streak
/// and stores the answer with source `ai`.
#[utoipa::path(
    post,
    path = "/api/recommendations/generate",
    responses(
        (status = 201, description = "Generated", body = [Recommendation]),
        (status = 400, description = "No study plans to base suggestions on")
    )
)]
pub async fn generate_recommendations(
    user: AuthUser,
    State(state): State<AppState>,
) -> Result<(StatusCode, ApiResponse<Vec<Recommendation>>), ApiError> {
    let profile = current_profile(&state, &user).await?;
    let plans = state.repo.list_study_plans(user.id).await?;
    if plans.is_empty() {
        return Err(ApiError::validation(
            "Create a study plan before asking for recommendations",
        ));
    }

    let standing = documents::get_typed::<LeaderboardEntry>(
        state.docs.as_ref(),
        LEADERBOARD,
        &user.id.to_string(),
    )
    .await?
    .unwrap_or_default();

    let context = StudentContext {
        name: profile.name,
        plans,
        points: standing.points,
        streak: standing.streak,
    };
    let lines = state.recommender.recommend(&context).await?;
    if lines.is_empty() {
        return Err(ApiError::Internal(
            "recommendation engine returned nothing".to_string(),
        ));
    }

    let created = state
        .repo
        .create_recommendations(user.id, models::SOURCE_AI, None, lines)
        .await?;
    tracing::info!(user = %user.id, count = created.len(), "generated recommendations");
    Ok((StatusCode::CREATED, ApiResponse::ok(created)))
}
