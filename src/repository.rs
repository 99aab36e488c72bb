use crate::{
    access::Role,
    models::{AdminStats, CreateStudyPlanRequest, Recommendation, StudyPlan, UpdateStudyPlanRequest, User},
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

/// Result type for relational store operations
pub type RepoResult<T> = Result<T, sqlx::Error>;

/// Repository Trait
///
/// The contract for all relational persistence. Point lookups return `Ok(None)` when the row
/// does not exist; list queries are bounded by a foreign key or an explicit limit.
///
/// Handlers only see `Arc<dyn Repository>`, so tests swap in mock implementations.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Profiles ---
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>>;
    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>>;
    async fn create_user(&self, user: User) -> RepoResult<User>;
    async fn list_users(&self, limit: i64, offset: i64) -> RepoResult<Vec<User>>;
    // Students only, optionally narrowed to a school and class.
    async fn list_students(
        &self,
        school: Option<String>,
        class_name: Option<String>,
    ) -> RepoResult<Vec<User>>;
    // Admin mutation. Returns None when the profile does not exist.
    async fn set_user_role(&self, id: Uuid, role: Role) -> RepoResult<Option<User>>;
    // Dependent study plans and recommendations go with it (ON DELETE CASCADE).
    async fn delete_user(&self, id: Uuid) -> RepoResult<bool>;
    async fn get_stats(&self) -> RepoResult<AdminStats>;

    // --- Study Plans ---
    async fn list_study_plans(&self, user_id: Uuid) -> RepoResult<Vec<StudyPlan>>;
    async fn get_study_plan(&self, id: Uuid) -> RepoResult<Option<StudyPlan>>;
    async fn create_study_plan(
        &self,
        user_id: Uuid,
        req: CreateStudyPlanRequest,
    ) -> RepoResult<StudyPlan>;
    // Owner-Only: None when the plan is missing or belongs to someone else.
    async fn update_study_plan(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: UpdateStudyPlanRequest,
    ) -> RepoResult<Option<StudyPlan>>;
    async fn delete_study_plan(&self, id: Uuid, user_id: Uuid) -> RepoResult<bool>;
    // Active plan count per student, for the teacher overview.
    async fn active_plan_counts(&self, user_ids: &[Uuid]) -> RepoResult<HashMap<Uuid, i64>>;

    // --- Recommendations ---
    async fn list_recommendations(&self, user_id: Uuid, limit: i64) -> RepoResult<Vec<Recommendation>>;
    // Inserts all lines in one transaction.
    async fn create_recommendations(
        &self,
        user_id: Uuid,
        source: &str,
        author_id: Option<Uuid>,
        contents: Vec<String>,
    ) -> RepoResult<Vec<Recommendation>>;
}

/// RepositoryState
///
/// The shared handle stored in `AppState`.
pub type RepositoryState = Arc<dyn Repository>;

const USER_COLUMNS: &str = "id, name, email, role, school, class_name, created_at";
const PLAN_COLUMNS: &str =
    "id, user_id, title, subject, target_date, progress, status, created_at, updated_at";

/// PostgresRepository
///
/// `Repository` backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM profiles WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM profiles WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
    }

    /// create_user
    ///
    /// Mirrors an identity created at the auth provider into `profiles`.
    async fn create_user(&self, user: User) -> RepoResult<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"INSERT INTO profiles (id, name, email, role, school, class_name, created_at)
               VALUES ($1, $2, $3, $4, $5, $6, NOW())
               RETURNING {USER_COLUMNS}"#
        ))
        .bind(user.id)
        .bind(user.name)
        .bind(user.email)
        .bind(user.role)
        .bind(user.school)
        .bind(user.class_name)
        .fetch_one(&self.pool)
        .await
    }

    async fn list_users(&self, limit: i64, offset: i64) -> RepoResult<Vec<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM profiles ORDER BY created_at DESC, id LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
    }

    /// list_students
    ///
    /// Dynamic filter built with QueryBuilder so every value stays a bound parameter. The role
    /// is matched the way `Role::from_str` reads it.
    async fn list_students(
        &self,
        school: Option<String>,
        class_name: Option<String>,
    ) -> RepoResult<Vec<User>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {USER_COLUMNS} FROM profiles WHERE lower(trim(role)) = 'student'"
        ));

        if let Some(school) = school {
            builder.push(" AND school = ");
            builder.push_bind(school);
        }
        if let Some(class_name) = class_name {
            builder.push(" AND class_name = ");
            builder.push_bind(class_name);
        }
        builder.push(" ORDER BY name ASC LIMIT 500");

        builder.build_query_as::<User>().fetch_all(&self.pool).await
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> RepoResult<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "UPDATE profiles SET role = $1 WHERE id = $2 RETURNING {USER_COLUMNS}"
        ))
        .bind(role.as_str())
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// get_stats
    ///
    /// All dashboard counters in one round trip.
    async fn get_stats(&self) -> RepoResult<AdminStats> {
        let (total_users, students, teachers, admins, study_plans, recommendations): (
            i64,
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                (SELECT COUNT(*) FROM profiles),
                (SELECT COUNT(*) FROM profiles WHERE lower(trim(role)) = 'student'),
                (SELECT COUNT(*) FROM profiles WHERE lower(trim(role)) = 'teacher'),
                (SELECT COUNT(*) FROM profiles WHERE lower(trim(role)) = 'admin'),
                (SELECT COUNT(*) FROM study_plans),
                (SELECT COUNT(*) FROM recommendations)
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(AdminStats {
            total_users,
            students,
            teachers,
            admins,
            study_plans,
            recommendations,
        })
    }

    // --- STUDY PLANS ---

    async fn list_study_plans(&self, user_id: Uuid) -> RepoResult<Vec<StudyPlan>> {
        sqlx::query_as::<_, StudyPlan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM study_plans WHERE user_id = $1 ORDER BY created_at DESC LIMIT 200"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn get_study_plan(&self, id: Uuid) -> RepoResult<Option<StudyPlan>> {
        sqlx::query_as::<_, StudyPlan>(&format!(
            "SELECT {PLAN_COLUMNS} FROM study_plans WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn create_study_plan(
        &self,
        user_id: Uuid,
        req: CreateStudyPlanRequest,
    ) -> RepoResult<StudyPlan> {
        sqlx::query_as::<_, StudyPlan>(&format!(
            r#"INSERT INTO study_plans (id, user_id, title, subject, target_date, progress, status, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, 0, 'active', NOW(), NOW())
               RETURNING {PLAN_COLUMNS}"#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(req.title)
        .bind(req.subject)
        .bind(req.target_date)
        .fetch_one(&self.pool)
        .await
    }

    /// update_study_plan
    ///
    /// COALESCE keeps every column whose patch field is None.
    async fn update_study_plan(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: UpdateStudyPlanRequest,
    ) -> RepoResult<Option<StudyPlan>> {
        sqlx::query_as::<_, StudyPlan>(&format!(
            r#"
            UPDATE study_plans
            SET title = COALESCE($3, title),
                subject = COALESCE($4, subject),
                target_date = COALESCE($5, target_date),
                progress = COALESCE($6, progress),
                status = COALESCE($7, status),
                updated_at = NOW()
            WHERE id = $1 AND user_id = $2
            RETURNING {PLAN_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(req.title)
        .bind(req.subject)
        .bind(req.target_date)
        .bind(req.progress)
        .bind(req.status.map(|s| s.as_str()))
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_study_plan(&self, id: Uuid, user_id: Uuid) -> RepoResult<bool> {
        let res = sqlx::query("DELETE FROM study_plans WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn active_plan_counts(&self, user_ids: &[Uuid]) -> RepoResult<HashMap<Uuid, i64>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT user_id, COUNT(*)
            FROM study_plans
            WHERE user_id = ANY($1) AND status = 'active'
            GROUP BY user_id
            "#,
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    // --- RECOMMENDATIONS ---

    async fn list_recommendations(&self, user_id: Uuid, limit: i64) -> RepoResult<Vec<Recommendation>> {
        sqlx::query_as::<_, Recommendation>(
            r#"SELECT id, user_id, content, source, author_id, created_at
               FROM recommendations
               WHERE user_id = $1
               ORDER BY created_at DESC
               LIMIT $2"#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    async fn create_recommendations(
        &self,
        user_id: Uuid,
        source: &str,
        author_id: Option<Uuid>,
        contents: Vec<String>,
    ) -> RepoResult<Vec<Recommendation>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(contents.len());
        for content in contents {
            let rec = sqlx::query_as::<_, Recommendation>(
                r#"INSERT INTO recommendations (id, user_id, content, source, author_id, created_at)
                   VALUES ($1, $2, $3, $4, $5, NOW())
                   RETURNING id, user_id, content, source, author_id, created_at"#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(content)
            .bind(source)
            .bind(author_id)
            .fetch_one(&mut *tx)
            .await?;
            created.push(rec);
        }
        tx.commit().await?;
        Ok(created)
    }
}
