use axum::extract::State;

use crate::{
    AppState,
    auth::AuthUser,
    error::{ApiResponse, ApiResult},
    extract::Query,
    leaderboard::{self, LeaderboardFilter},
    models::{LeaderboardPage, MyRank},
};

use super::current_profile;

/// get_leaderboard
///
/// [Authenticated Route] Ranked by points, optionally narrowed to a school and class.
#[utoipa::path(
    get,
    path = "/api/leaderboard",
    params(LeaderboardFilter),
    responses(
        (status = 200, description = "One page of the ranking", body = LeaderboardPage),
        (status = 400, description = "limit of 0")
    )
)]
pub async fn get_leaderboard(
    _user: AuthUser,
    State(state): State<AppState>,
    Query(filter): Query<LeaderboardFilter>,
) -> ApiResult<LeaderboardPage> {
    let page = leaderboard::page(state.docs.as_ref(), &filter).await?;
    Ok(ApiResponse::ok(page))
}

/// get_my_rank
///
/// [Authenticated Route] The caller's overall and in-class position.
#[utoipa::path(
    get,
    path = "/api/leaderboard/me",
    responses((status = 200, description = "My rank", body = MyRank))
)]
pub async fn get_my_rank(user: AuthUser, State(state): State<AppState>) -> ApiResult<MyRank> {
    let profile = current_profile(&state, &user).await?;
    let store = state.docs.as_ref();

    let overall = leaderboard::rank_of(store, user.id, None, None).await?;
    let in_class = match (&profile.school, &profile.class_name) {
        (Some(school), Some(class_name)) => {
            leaderboard::rank_of(store, user.id, Some(school.as_str()), Some(class_name.as_str()))
                .await?
        }
        _ => None,
    };

    Ok(ApiResponse::ok(MyRank { overall, in_class }))
}
