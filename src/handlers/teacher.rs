//! Teacher area. Teachers see students of their own school only; an admin passing through
//! the override sees every school.

use axum::{extract::State, http::StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::{
    AppState,
    access::Role,
    auth::AuthUser,
    documents::{self, Query as DocQuery},
    error::{ApiError, ApiResponse, ApiResult},
    extract::{Json, Path, Query},
    leaderboard::LEADERBOARD,
    models::{
        self, CreateRecommendationRequest, LeaderboardEntry, Recommendation, StudentOverview,
        StudyPlan, User,
    },
};

use super::{current_profile, required};

pub const MAX_RECOMMENDATION_LEN: usize = 2000;

#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct StudentFilter {
    /// Only honoured for admins; teachers are pinned to their own school.
    pub school: Option<String>,
    pub class_name: Option<String>,
}

/// The school a caller may look at. `None` means every school (admins only).
async fn school_scope(
    state: &AppState,
    user: &AuthUser,
    requested: Option<String>,
) -> Result<Option<String>, ApiError> {
    if user.role == Role::Admin {
        return Ok(requested);
    }
    match current_profile(state, user).await?.school {
        Some(school) => Ok(Some(school)),
        None => Err(ApiError::forbidden("Your profile is not linked to a school")),
    }
}

/// load_student
///
/// The student behind `id`, if the caller may see them. Non-students are reported as missing.
async fn load_student(state: &AppState, user: &AuthUser, id: Uuid) -> Result<User, ApiError> {
    let student = state
        .repo
        .get_user(id)
        .await?
        .filter(|u| u.parsed_role() == Ok(Role::Student))
        .ok_or_else(|| ApiError::not_found("Student not found"))?;

    if let Some(school) = school_scope(state, user, None).await? {
        if student.school.as_deref() != Some(school.as_str()) {
            return Err(ApiError::forbidden("Student belongs to another school"));
        }
    }
    Ok(student)
}

/// list_students
///
/// [Teacher Route] Students of the caller's school with their active plan count and points.
#[utoipa::path(
    get,
    path = "/api/teacher/students",
    params(StudentFilter),
    responses(
        (status = 200, description = "Students", body = [StudentOverview]),
        (status = 403, description = "Teacher without a school")
    )
)]
pub async fn list_students(
    user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<StudentFilter>,
) -> ApiResult<Vec<StudentOverview>> {
    let school = school_scope(&state, &user, filter.school).await?;
    let students = state
        .repo
        .list_students(school.clone(), filter.class_name)
        .await?;

    let ids: Vec<Uuid> = students.iter().map(|s| s.id).collect();
    let plan_counts = state.repo.active_plan_counts(&ids).await?;

    let mut standings = DocQuery::collection(LEADERBOARD);
    if let Some(school) = &school {
        standings = standings.filter("school", school.as_str());
    }
    let points: HashMap<Uuid, i64> =
        documents::query_typed::<LeaderboardEntry>(state.docs.as_ref(), &standings)
            .await?
            .into_iter()
            .map(|entry| (entry.user_id, entry.points))
            .collect();

    let overview = students
        .into_iter()
        .map(|s| StudentOverview {
            active_plans: plan_counts.get(&s.id).copied().unwrap_or(0),
            points: points.get(&s.id).copied().unwrap_or(0),
            id: s.id,
            name: s.name,
            email: s.email,
            class_name: s.class_name,
        })
        .collect();
    Ok(ApiResponse::ok(overview))
}

/// student_study_plans
///
/// [Teacher Route] Read-only view of one student's plans.
#[utoipa::path(
    get,
    path = "/api/teacher/students/{id}/study-plans",
    params(("id" = Uuid, Path, description = "Student ID")),
    responses(
        (status = 200, description = "Plans", body = [StudyPlan]),
        (status = 403, description = "Other school"),
        (status = 404, description = "Not a student")
    )
)]
pub async fn student_study_plans(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<StudyPlan>> {
    let student = load_student(&state, &user, id).await?;
    Ok(ApiResponse::ok(state.repo.list_study_plans(student.id).await?))
}

/// add_recommendation
///
/// [Teacher Route] A manual suggestion for a student, stored with source `teacher` and the
/// caller as author.
#[utoipa::path(
    post,
    path = "/api/teacher/students/{id}/recommendations",
    params(("id" = Uuid, Path, description = "Student ID")),
    request_body = CreateRecommendationRequest,
    responses(
        (status = 201, description = "Created", body = Recommendation),
        (status = 400, description = "Empty or too long"),
        (status = 403, description = "Other school"),
        (status = 404, description = "Not a student")
    )
)]
pub async fn add_recommendation(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CreateRecommendationRequest>,
) -> Result<(StatusCode, ApiResponse<Recommendation>), ApiError> {
    let content = required("content", &payload.content)?;
    if content.chars().count() > MAX_RECOMMENDATION_LEN {
        return Err(ApiError::validation(format!(
            "content must be at most {MAX_RECOMMENDATION_LEN} characters"
        )));
    }

    let student = load_student(&state, &user, id).await?;
    let created = state
        .repo
        .create_recommendations(
            student.id,
            models::SOURCE_TEACHER,
            Some(user.id),
            vec![content],
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Internal("recommendation insert returned no row".to_string()))?;

    tracing::info!(teacher = %user.id, student = %student.id, "teacher recommendation added");
    Ok((StatusCode::CREATED, ApiResponse::ok(created)))
}
