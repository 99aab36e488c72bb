use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::access::{Role, UnknownRole};

// --- Relational Records (system of record) ---

/// User
///
/// The canonical identity record stored in the `profiles` table. `role` is kept as the raw
/// column text so that a malformed value surfaces as an authorization failure instead of a
/// decode error.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: String,
    pub school: Option<String>,
    pub class_name: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn parsed_role(&self) -> Result<Role, UnknownRole> {
        self.role.parse()
    }
}

/// StudyPlan
///
/// A student's tracked plan (`study_plans` table). `progress` is a percentage in 0..=100.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct StudyPlan {
    pub id: Uuid,
    // FK to profiles.id (owner).
    pub user_id: Uuid,
    pub title: String,
    pub subject: String,
    #[ts(type = "string | null")]
    pub target_date: Option<NaiveDate>,
    pub progress: i32,
    // 'active' | 'completed' | 'archived'
    pub status: String,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum StudyPlanStatus {
    Active,
    Completed,
    Archived,
}

impl StudyPlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StudyPlanStatus::Active => "active",
            StudyPlanStatus::Completed => "completed",
            StudyPlanStatus::Archived => "archived",
        }
    }
}

/// Recommendation
///
/// A study suggestion attached to a student, either generated by the AI engine
/// (`source = "ai"`, no author) or written by a teacher (`source = "teacher"`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[ts(export)]
pub struct Recommendation {
    pub id: Uuid,
    pub user_id: Uuid,
    pub content: String,
    pub source: String,
    pub author_id: Option<Uuid>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

pub const SOURCE_AI: &str = "ai";
pub const SOURCE_TEACHER: &str = "teacher";

// --- Request Payloads (Input Schemas) ---

/// SignUpRequest
///
/// Self-service registration. The password is forwarded to the auth provider and never stored
/// or logged here. New accounts always start as students.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SignUpRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub school: Option<String>,
    pub class_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct CreateStudyPlanRequest {
    pub title: String,
    pub subject: String,
    #[ts(type = "string | null")]
    pub target_date: Option<NaiveDate>,
}

/// UpdateStudyPlanRequest
///
/// Partial update: only the provided fields change.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UpdateStudyPlanRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[ts(type = "string | null")]
    pub target_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StudyPlanStatus>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[ts(export)]
pub struct CreateRecommendationRequest {
    pub content: String,
}

/// UpdateRoleRequest
///
/// Admin-only role mutation. The role arrives as free text and is validated by the handler so
/// that an unknown tag is a 400 rather than a body-decoding rejection.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct CreateGoalRequest {
    pub title: String,
}

// --- Dashboard & Profile Schemas (Output) ---

/// UserProfile
///
/// Output of `GET /api/me`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub school: Option<String>,
    pub class_name: Option<String>,
}

impl UserProfile {
    pub fn new(user: User, role: Role) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            role,
            school: user.school,
            class_name: user.class_name,
        }
    }
}

/// SessionView
///
/// Output of `GET /api/session`. `status` is `"authenticated"` or `"unauthenticated"`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SessionView {
    pub status: String,
    pub user: Option<SessionUser>,
    #[ts(type = "string | null")]
    pub expires: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SessionUser {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct AdminStats {
    pub total_users: i64,
    pub students: i64,
    pub teachers: i64,
    pub admins: i64,
    pub study_plans: i64,
    pub recommendations: i64,
}

/// StudentOverview
///
/// One row of the teacher's class view.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StudentOverview {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub class_name: Option<String>,
    pub active_plans: i64,
    pub points: i64,
}

// --- Document Store Shapes (field names are the shared convention) ---

/// Document timestamps are stored as RFC 3339 with exactly six fractional digits, so that
/// sorting the strings sorts the instants.
pub mod timestamp {
    use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// The current time at the stored precision.
    pub fn now() -> DateTime<Utc> {
        Utc::now().trunc_subsecs(6)
    }

    pub fn format(at: &DateTime<Utc>) -> String {
        at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    pub fn serialize<S: Serializer>(
        at: &DateTime<Utc>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        DateTime::<Utc>::deserialize(deserializer)
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            at: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match at {
                Some(at) => serializer.serialize_some(&super::format(at)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<DateTime<Utc>>, D::Error> {
            Option::<DateTime<Utc>>::deserialize(deserializer)
        }
    }
}

/// LeaderboardEntry
///
/// Document in the `leaderboard` collection, keyed by the user id.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    pub name: String,
    pub school: Option<String>,
    pub class_name: Option<String>,
    pub points: i64,
    pub streak: i64,
    pub completed_goals: i64,
    // Date of the last completed goal, used for the streak.
    pub last_completed: Option<String>,
    #[serde(with = "timestamp")]
    #[ts(type = "string")]
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct RankedEntry {
    pub rank: u64,
    #[serde(flatten)]
    pub entry: LeaderboardEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LeaderboardPage {
    pub entries: Vec<RankedEntry>,
    pub limit: u64,
    pub offset: u64,
    pub next_offset: Option<u64>,
}

/// DailyGoal
///
/// Document in the `daily_goals` collection. `date` is the calendar day (YYYY-MM-DD, UTC)
/// the goal belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct DailyGoal {
    pub id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    pub school: Option<String>,
    pub class_name: Option<String>,
    pub title: String,
    pub date: String,
    pub completed: bool,
    #[serde(default, with = "timestamp::option")]
    #[ts(type = "string | null")]
    pub completed_at: Option<DateTime<Utc>>,
    pub cheer_count: i64,
    #[serde(with = "timestamp")]
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// GoalCheer
///
/// Document in `goal_cheers`, id `<goalId>_<userId>` so a user can cheer a goal only once.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GoalCheer {
    pub goal_id: Uuid,
    pub user_id: Uuid,
    pub user_name: String,
    #[serde(with = "timestamp")]
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

// --- Auth & Gate Schemas (Output) ---

/// AuthResponse
///
/// Output of sign-up and sign-in. The same token is also set as the session cookie; API
/// clients send it back as a bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
    #[ts(type = "string")]
    pub expires: DateTime<Utc>,
}

/// GateView
///
/// Output of `GET /api/session/gate`: what a client-rendered page should do right now.
/// `outcome` is `"render"`, `"loading"` or `"redirect"`.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct GateView {
    pub outcome: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, PartialEq)]
#[ts(export)]
pub struct Deleted {
    pub id: Uuid,
}

/// MyRank
///
/// The caller's position overall and within their class. Either is null until the first
/// completed goal (or without a class).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct MyRank {
    pub overall: Option<RankedEntry>,
    pub in_class: Option<RankedEntry>,
}
