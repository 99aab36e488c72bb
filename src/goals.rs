//! Daily goals, class feed and cheers over the `daily_goals` / `goal_cheers` collections.
//!
//! Every multi-document change goes through one `WriteBatch` so a goal, its cheers and the
//! owner's leaderboard entry never disagree. Counters are written as increments and state
//! checks as batch preconditions, so concurrent requests cannot overwrite each other.

use chrono::{NaiveDate, Utc};
use serde_json::json;
use uuid::Uuid;

use crate::{
    access::Role,
    auth::AuthUser,
    documents::{self, DocumentError, DocumentStore, Direction, Query, WriteBatch},
    error::ApiError,
    leaderboard::{self, LEADERBOARD},
    models::{DailyGoal, GoalCheer, LeaderboardEntry, User, timestamp},
};

pub const GOALS: &str = "daily_goals";
pub const CHEERS: &str = "goal_cheers";
pub const POINTS_PER_GOAL: i64 = 10;
pub const MAX_GOALS_PER_DAY: usize = 10;
pub const MAX_TITLE_LEN: usize = 200;
pub const FEED_LIMIT: usize = 50;

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

pub fn cheer_id(goal_id: Uuid, user_id: Uuid) -> String {
    format!("{goal_id}_{user_id}")
}

async fn load_goal(store: &dyn DocumentStore, goal_id: Uuid) -> Result<DailyGoal, ApiError> {
    documents::get_typed::<DailyGoal>(store, GOALS, &goal_id.to_string())
        .await?
        .ok_or_else(|| ApiError::not_found("Goal not found"))
}

/// create
///
/// Adds a goal for today. Titles are trimmed; empty or overlong titles and more than
/// `MAX_GOALS_PER_DAY` goals in a day are rejected.
pub async fn create(
    store: &dyn DocumentStore,
    owner: &User,
    title: &str,
) -> Result<DailyGoal, ApiError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ApiError::validation("Goal title is required"));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ApiError::validation(format!(
            "Goal title must be at most {MAX_TITLE_LEN} characters"
        )));
    }

    let date = today().to_string();
    let existing = store
        .query(
            &Query::collection(GOALS)
                .filter("userId", owner.id.to_string())
                .filter("date", date.clone()),
        )
        .await?;
    if existing.len() >= MAX_GOALS_PER_DAY {
        return Err(ApiError::validation(format!(
            "At most {MAX_GOALS_PER_DAY} goals per day"
        )));
    }

    let goal = DailyGoal {
        id: Uuid::new_v4(),
        user_id: owner.id,
        user_name: owner.name.clone(),
        school: owner.school.clone(),
        class_name: owner.class_name.clone(),
        title: title.to_string(),
        date,
        completed: false,
        completed_at: None,
        cheer_count: 0,
        created_at: timestamp::now(),
    };

    let mut batch = WriteBatch::new();
    batch.set(GOALS, &goal.id.to_string(), &goal)?;
    store.commit(batch).await?;
    Ok(goal)
}

/// Goals of one user, newest first, optionally limited to one day.
pub async fn list_for_user(
    store: &dyn DocumentStore,
    user_id: Uuid,
    date: Option<&str>,
) -> Result<Vec<DailyGoal>, ApiError> {
    let mut query = Query::collection(GOALS)
        .filter("userId", user_id.to_string())
        .order_by("createdAt", Direction::Desc);
    if let Some(date) = date {
        query = query.filter("date", date);
    }
    Ok(documents::query_typed(store, &query).await?)
}

/// class_feed
///
/// Today's goals of everyone in the viewer's school and class, newest first. A viewer without
/// a class gets an empty feed.
pub async fn class_feed(
    store: &dyn DocumentStore,
    viewer: &User,
) -> Result<Vec<DailyGoal>, ApiError> {
    let (Some(school), Some(class_name)) = (&viewer.school, &viewer.class_name) else {
        return Ok(Vec::new());
    };

    let query = Query::collection(GOALS)
        .filter("school", school.as_str())
        .filter("className", class_name.as_str())
        .filter("date", today().to_string())
        .order_by("createdAt", Direction::Desc)
        .limit(FEED_LIMIT);
    Ok(documents::query_typed(store, &query).await?)
}

/// complete
///
/// Marks the caller's goal done and awards `POINTS_PER_GOAL` in the same batch. The batch
/// only lands while the goal is still open, so a goal pays out once.
pub async fn complete(
    store: &dyn DocumentStore,
    goal_id: Uuid,
    owner: &User,
) -> Result<DailyGoal, ApiError> {
    let goal = load_goal(store, goal_id).await?;
    if goal.user_id != owner.id {
        return Err(ApiError::forbidden("Only the owner can complete a goal"));
    }
    if goal.completed {
        return Err(ApiError::validation("Goal is already completed"));
    }

    let now = timestamp::now();
    let existing =
        documents::get_typed::<LeaderboardEntry>(store, LEADERBOARD, &owner.id.to_string())
            .await?;
    let entry = leaderboard::award(existing, owner, POINTS_PER_GOAL, now.date_naive());

    let key = goal.id.to_string();
    let mut batch = WriteBatch::new();
    batch.require(GOALS, &key, "completed", false).merge(
        GOALS,
        &key,
        json!({ "completed": true, "completedAt": timestamp::format(&now) }),
    )?;
    leaderboard::stage_award(&mut batch, &entry, POINTS_PER_GOAL)?;

    match store.commit(batch).await {
        Ok(()) => {}
        Err(DocumentError::PreconditionFailed(_)) => {
            // Completed (or deleted) by a concurrent request.
            load_goal(store, goal_id).await?;
            return Err(ApiError::validation("Goal is already completed"));
        }
        Err(err) => return Err(err.into()),
    }

    tracing::info!(goal = %goal.id, user = %owner.id, points = POINTS_PER_GOAL, "goal completed");
    load_goal(store, goal_id).await
}

/// cheer
///
/// One cheer per user per goal, never on one's own goal. The cheer document is created and
/// the goal's counter incremented in one batch that fails if either the cheer already exists
/// or the goal is gone.
pub async fn cheer(
    store: &dyn DocumentStore,
    goal_id: Uuid,
    user: &AuthUser,
) -> Result<DailyGoal, ApiError> {
    let goal = load_goal(store, goal_id).await?;
    if goal.user_id == user.id {
        return Err(ApiError::validation("You cannot cheer your own goal"));
    }

    let id = cheer_id(goal.id, user.id);
    if store.get(CHEERS, &id).await?.is_some() {
        return Err(ApiError::validation("You already cheered this goal"));
    }

    let cheer = GoalCheer {
        goal_id: goal.id,
        user_id: user.id,
        user_name: user.name.clone(),
        created_at: timestamp::now(),
    };

    let key = goal.id.to_string();
    let mut batch = WriteBatch::new();
    batch
        .require(GOALS, &key, "id", key.as_str())
        .create(CHEERS, &id, &cheer)?
        .increment(GOALS, &key, "cheerCount", 1);

    match store.commit(batch).await {
        Ok(()) => {}
        Err(DocumentError::PreconditionFailed(_)) => {
            load_goal(store, goal_id).await?;
            return Err(ApiError::validation("You already cheered this goal"));
        }
        Err(err) => return Err(err.into()),
    }
    load_goal(store, goal_id).await
}

/// delete
///
/// Removes a goal and all of its cheers. Owners may delete their goals; admins any goal.
/// Points already awarded stay.
pub async fn delete(
    store: &dyn DocumentStore,
    goal_id: Uuid,
    user: &AuthUser,
) -> Result<(), ApiError> {
    let goal = load_goal(store, goal_id).await?;
    if goal.user_id != user.id && user.role != Role::Admin {
        return Err(ApiError::forbidden("Only the owner can delete a goal"));
    }

    let cheers = store
        .query(&Query::collection(CHEERS).filter("goalId", goal.id.to_string()))
        .await?;

    let mut batch = WriteBatch::new();
    for snapshot in &cheers {
        batch.delete(CHEERS, &snapshot.id);
    }
    batch.delete(GOALS, &goal.id.to_string());
    store.commit(batch).await?;
    Ok(())
}

/// purge_user
///
/// Removes everything the document store holds for a deleted profile: the leaderboard entry,
/// their goals, cheers on those goals and cheers they gave. Returns the number of deletes.
pub async fn purge_user(store: &dyn DocumentStore, user_id: Uuid) -> Result<usize, ApiError> {
    let uid = user_id.to_string();
    let mut batch = WriteBatch::new();
    batch.delete(LEADERBOARD, &uid);

    let goals = store
        .query(&Query::collection(GOALS).filter("userId", uid.as_str()))
        .await?;
    for goal in &goals {
        let cheers = store
            .query(&Query::collection(CHEERS).filter("goalId", goal.id.as_str()))
            .await?;
        for cheer in &cheers {
            batch.delete(CHEERS, &cheer.id);
        }
        batch.delete(GOALS, &goal.id);
    }

    let given = store
        .query(&Query::collection(CHEERS).filter("userId", uid.as_str()))
        .await?;
    for cheer in &given {
        batch.delete(CHEERS, &cheer.id);
    }

    let deletes = batch.len();
    store.commit(batch).await?;
    tracing::info!(user = %user_id, deletes, "purged user documents");
    Ok(deletes)
}
