//! Leaderboard queries and point awards over the `leaderboard` collection.

use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    documents::{self, DocumentStore, Direction, Query, WriteBatch},
    error::ApiError,
    models::{LeaderboardEntry, LeaderboardPage, RankedEntry, User, timestamp},
};

pub const LEADERBOARD: &str = "leaderboard";
pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;

/// LeaderboardFilter
///
/// Query parameters of `GET /api/leaderboard`.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardFilter {
    pub school: Option<String>,
    pub class_name: Option<String>,
    /// 1..=100, default 20. Larger values are capped.
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

pub fn effective_limit(limit: Option<u64>) -> Result<u64, ApiError> {
    match limit {
        None => Ok(DEFAULT_LIMIT),
        Some(0) => Err(ApiError::validation("limit must be at least 1")),
        Some(n) => Ok(n.min(MAX_LIMIT)),
    }
}

fn base_query(school: Option<&str>, class_name: Option<&str>) -> Query {
    let mut query = Query::collection(LEADERBOARD).order_by("points", Direction::Desc);
    if let Some(school) = school {
        query = query.filter("school", school);
    }
    if let Some(class_name) = class_name {
        query = query.filter("className", class_name);
    }
    query
}

/// page
///
/// Points descending, ties by user id. One extra row is fetched to know whether a next
/// page exists.
pub async fn page(
    store: &dyn DocumentStore,
    filter: &LeaderboardFilter,
) -> Result<LeaderboardPage, ApiError> {
    let limit = effective_limit(filter.limit)?;
    let offset = filter.offset.unwrap_or(0);

    let query = base_query(filter.school.as_deref(), filter.class_name.as_deref())
        .limit(limit as usize + 1)
        .offset(offset as usize);
    let mut entries: Vec<LeaderboardEntry> = documents::query_typed(store, &query).await?;

    let has_more = entries.len() as u64 > limit;
    entries.truncate(limit as usize);

    let entries = entries
        .into_iter()
        .enumerate()
        .map(|(i, entry)| RankedEntry {
            rank: offset + i as u64 + 1,
            entry,
        })
        .collect();

    Ok(LeaderboardPage {
        entries,
        limit,
        offset,
        next_offset: has_more.then_some(offset + limit),
    })
}

/// rank_of
///
/// Position of one user within the given scope, or None when they have no entry yet.
pub async fn rank_of(
    store: &dyn DocumentStore,
    user_id: Uuid,
    school: Option<&str>,
    class_name: Option<&str>,
) -> Result<Option<RankedEntry>, ApiError> {
    if documents::get_typed::<LeaderboardEntry>(store, LEADERBOARD, &user_id.to_string())
        .await?
        .is_none()
    {
        return Ok(None);
    }

    let ordered: Vec<LeaderboardEntry> =
        documents::query_typed(store, &base_query(school, class_name)).await?;
    Ok(ordered
        .into_iter()
        .enumerate()
        .find(|(_, entry)| entry.user_id == user_id)
        .map(|(i, entry)| RankedEntry {
            rank: i as u64 + 1,
            entry,
        }))
}

/// award
///
/// Next state of a user's entry after completing a goal on `day`. Streaks grow on
/// consecutive days, hold within a day and restart after a gap.
pub fn award(
    existing: Option<LeaderboardEntry>,
    profile: &User,
    points: i64,
    day: NaiveDate,
) -> LeaderboardEntry {
    let mut entry = existing.unwrap_or_else(|| LeaderboardEntry {
        user_id: profile.id,
        ..LeaderboardEntry::default()
    });

    let last = entry
        .last_completed
        .as_deref()
        .and_then(|d| d.parse::<NaiveDate>().ok());
    entry.streak = match last {
        Some(last) if last == day => entry.streak.max(1),
        Some(last) if last.succ_opt() == Some(day) => entry.streak + 1,
        _ => 1,
    };

    // Profile fields are refreshed so renames and class moves show up in rankings.
    entry.name = profile.name.clone();
    entry.school = profile.school.clone();
    entry.class_name = profile.class_name.clone();
    entry.points += points;
    entry.completed_goals += 1;
    entry.last_completed = Some(day.to_string());
    entry.updated_at = timestamp::now();
    entry
}

/// stage_award
///
/// Adds an award to a batch. Profile and streak fields of `entry` are merged; `points` and
/// `completedGoals` are incremented on the stored document rather than overwritten, so two
/// awards committed back to back both count.
pub fn stage_award(
    batch: &mut WriteBatch,
    entry: &LeaderboardEntry,
    points: i64,
) -> Result<(), ApiError> {
    let key = entry.user_id.to_string();
    let mut fields = serde_json::to_value(entry)
        .map_err(|err| ApiError::Internal(format!("leaderboard entry: {err}")))?;
    if let Some(fields) = fields.as_object_mut() {
        fields.remove("points");
        fields.remove("completedGoals");
    }

    batch
        .merge(LEADERBOARD, &key, fields)?
        .increment(LEADERBOARD, &key, "points", points)
        .increment(LEADERBOARD, &key, "completedGoals", 1);
    Ok(())
}
