#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{HeaderMap, Request, StatusCode, header},
};
use chrono::Utc;
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};
use studyhub::{
    AppState,
    access::Role,
    auth,
    config::AppConfig,
    create_router,
    documents::MemoryDocumentStore,
    error::ApiError,
    models::{
        AdminStats, CreateStudyPlanRequest, Recommendation, StudyPlan, UpdateStudyPlanRequest,
        User,
    },
    provider::{AuthProvider, ProviderError},
    recommend::{RecommendationEngine, StudentContext},
    repository::{RepoResult, Repository},
};
use tower::ServiceExt;
use uuid::Uuid;

pub const SCHOOL: &str = "Northside High";
pub const CLASS: &str = "10A";

// --- MOCK REPOSITORY IMPLEMENTATION ---

// Behaves like the Postgres repository (ownership filters, cascades) over plain vectors.
#[derive(Default)]
pub struct InMemoryRepo {
    pub users: Mutex<Vec<User>>,
    pub plans: Mutex<Vec<StudyPlan>>,
    pub recommendations: Mutex<Vec<Recommendation>>,
}

impl InMemoryRepo {
    pub fn insert_user(&self, user: User) {
        self.users.lock().unwrap().push(user);
    }

    pub fn role_of(&self, id: Uuid) -> Option<String> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.id == id)
            .map(|u| u.role.clone())
    }
}

#[async_trait]
impl Repository for InMemoryRepo {
    async fn get_user(&self, id: Uuid) -> RepoResult<Option<User>> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_email(&self, email: &str) -> RepoResult<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create_user(&self, user: User) -> RepoResult<User> {
        self.users.lock().unwrap().push(user.clone());
        Ok(user)
    }

    async fn list_users(&self, limit: i64, offset: i64) -> RepoResult<Vec<User>> {
        let mut users = self.users.lock().unwrap().clone();
        users.sort_by_key(|u| u.created_at);
        Ok(users
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn list_students(
        &self,
        school: Option<String>,
        class_name: Option<String>,
    ) -> RepoResult<Vec<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.parsed_role() == Ok(Role::Student))
            .filter(|u| school.is_none() || u.school == school)
            .filter(|u| class_name.is_none() || u.class_name == class_name)
            .cloned()
            .collect())
    }

    async fn set_user_role(&self, id: Uuid, role: Role) -> RepoResult<Option<User>> {
        let mut users = self.users.lock().unwrap();
        Ok(users.iter_mut().find(|u| u.id == id).map(|u| {
            u.role = role.as_str().to_string();
            u.clone()
        }))
    }

    async fn delete_user(&self, id: Uuid) -> RepoResult<bool> {
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| u.id != id);
        let removed = users.len() != before;
        if removed {
            self.plans.lock().unwrap().retain(|p| p.user_id != id);
            self.recommendations
                .lock()
                .unwrap()
                .retain(|r| r.user_id != id);
        }
        Ok(removed)
    }

    async fn get_stats(&self) -> RepoResult<AdminStats> {
        let users = self.users.lock().unwrap();
        let count = |role: Role| {
            users
                .iter()
                .filter(|u| u.parsed_role() == Ok(role))
                .count() as i64
        };
        Ok(AdminStats {
            total_users: users.len() as i64,
            students: count(Role::Student),
            teachers: count(Role::Teacher),
            admins: count(Role::Admin),
            study_plans: self.plans.lock().unwrap().len() as i64,
            recommendations: self.recommendations.lock().unwrap().len() as i64,
        })
    }

    async fn list_study_plans(&self, user_id: Uuid) -> RepoResult<Vec<StudyPlan>> {
        let mut plans: Vec<StudyPlan> = self
            .plans
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect();
        plans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(plans)
    }

    async fn get_study_plan(&self, id: Uuid) -> RepoResult<Option<StudyPlan>> {
        Ok(self.plans.lock().unwrap().iter().find(|p| p.id == id).cloned())
    }

    async fn create_study_plan(
        &self,
        user_id: Uuid,
        req: CreateStudyPlanRequest,
    ) -> RepoResult<StudyPlan> {
        let now = Utc::now();
        let plan = StudyPlan {
            id: Uuid::new_v4(),
            user_id,
            title: req.title,
            subject: req.subject,
            target_date: req.target_date,
            progress: 0,
            status: "active".to_string(),
            created_at: now,
            updated_at: now,
        };
        self.plans.lock().unwrap().push(plan.clone());
        Ok(plan)
    }

    async fn update_study_plan(
        &self,
        id: Uuid,
        user_id: Uuid,
        req: UpdateStudyPlanRequest,
    ) -> RepoResult<Option<StudyPlan>> {
        let mut plans = self.plans.lock().unwrap();
        Ok(plans
            .iter_mut()
            .find(|p| p.id == id && p.user_id == user_id)
            .map(|p| {
                if let Some(title) = req.title {
                    p.title = title;
                }
                if let Some(subject) = req.subject {
                    p.subject = subject;
                }
                if req.target_date.is_some() {
                    p.target_date = req.target_date;
                }
                if let Some(progress) = req.progress {
                    p.progress = progress;
                }
                if let Some(status) = req.status {
                    p.status = status.as_str().to_string();
                }
                p.updated_at = Utc::now();
                p.clone()
            }))
    }

    async fn delete_study_plan(&self, id: Uuid, user_id: Uuid) -> RepoResult<bool> {
        let mut plans = self.plans.lock().unwrap();
        let before = plans.len();
        plans.retain(|p| !(p.id == id && p.user_id == user_id));
        Ok(plans.len() != before)
    }

    async fn active_plan_counts(&self, user_ids: &[Uuid]) -> RepoResult<HashMap<Uuid, i64>> {
        let mut counts = HashMap::new();
        for plan in self.plans.lock().unwrap().iter() {
            if plan.status == "active" && user_ids.contains(&plan.user_id) {
                *counts.entry(plan.user_id).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn list_recommendations(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> RepoResult<Vec<Recommendation>> {
        let mut list: Vec<Recommendation> = self
            .recommendations
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list.truncate(limit as usize);
        Ok(list)
    }

    async fn create_recommendations(
        &self,
        user_id: Uuid,
        source: &str,
        author_id: Option<Uuid>,
        contents: Vec<String>,
    ) -> RepoResult<Vec<Recommendation>> {
        let created: Vec<Recommendation> = contents
            .into_iter()
            .map(|content| Recommendation {
                id: Uuid::new_v4(),
                user_id,
                content,
                source: source.to_string(),
                author_id,
                created_at: Utc::now(),
            })
            .collect();
        self.recommendations
            .lock()
            .unwrap()
            .extend(created.iter().cloned());
        Ok(created)
    }
}

// --- MOCK AUTH PROVIDER ---

#[derive(Default)]
pub struct MockAuthProvider {
    // email -> (password, provider id)
    pub accounts: Mutex<HashMap<String, (String, Uuid)>>,
}

impl MockAuthProvider {
    pub fn with_account(self, email: &str, password: &str, id: Uuid) -> Self {
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), id));
        self
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid, ProviderError> {
        let mut accounts = self.accounts.lock().unwrap();
        if accounts.contains_key(email) {
            return Err(ProviderError::Rejected("User already registered".to_string()));
        }
        let id = Uuid::new_v4();
        accounts.insert(email.to_string(), (password.to_string(), id));
        Ok(id)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Uuid, ProviderError> {
        match self.accounts.lock().unwrap().get(email) {
            Some((stored, id)) if stored == password => Ok(*id),
            _ => Err(ProviderError::InvalidCredentials),
        }
    }
}

// --- MOCK RECOMMENDATION ENGINE ---

#[derive(Default)]
pub struct MockEngine {
    pub lines: Vec<String>,
    pub seen: Mutex<Vec<StudentContext>>,
}

impl MockEngine {
    pub fn answering(lines: &[&str]) -> Self {
        Self {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            seen: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl RecommendationEngine for MockEngine {
    async fn recommend(&self, student: &StudentContext) -> Result<Vec<String>, ApiError> {
        self.seen.lock().unwrap().push(student.clone());
        Ok(self.lines.clone())
    }
}

// --- TEST UTILITIES ---

pub fn user(role: &str) -> User {
    let id = Uuid::new_v4();
    User {
        id,
        name: format!("{role} {}", &id.simple().to_string()[..6]),
        email: format!("{}@northside.test", id.simple()),
        role: role.to_string(),
        school: Some(SCHOOL.to_string()),
        class_name: Some(CLASS.to_string()),
        created_at: Utc::now(),
    }
}

/// AppState over in-memory services, with handles kept for assertions.
pub struct TestApp {
    pub state: AppState,
    pub repo: Arc<InMemoryRepo>,
    pub docs: Arc<MemoryDocumentStore>,
    pub auth: Arc<MockAuthProvider>,
    pub engine: Arc<MockEngine>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(AppConfig::default(), MockAuthProvider::default(), MockEngine::default())
    }

    pub fn with_config(config: AppConfig) -> Self {
        Self::build(config, MockAuthProvider::default(), MockEngine::default())
    }

    pub fn build(config: AppConfig, auth: MockAuthProvider, engine: MockEngine) -> Self {
        let repo = Arc::new(InMemoryRepo::default());
        let docs = Arc::new(MemoryDocumentStore::new());
        let auth = Arc::new(auth);
        let engine = Arc::new(engine);
        let state = AppState {
            repo: repo.clone(),
            docs: docs.clone(),
            auth: auth.clone(),
            recommender: engine.clone(),
            config,
        };
        Self {
            state,
            repo,
            docs,
            auth,
            engine,
        }
    }

    pub fn seed(&self, role: &str) -> User {
        let user = user(role);
        self.repo.insert_user(user.clone());
        user
    }

    pub fn token(&self, user: &User) -> String {
        auth::issue_token(user, &self.state.config).unwrap().0
    }

    pub fn bearer(&self, user: &User) -> String {
        format!("Bearer {}", self.token(user))
    }

    /// Sends one request through the full router.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = create_router(self.state.clone())
            .oneshot(request)
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8_lossy(&bytes).to_string();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse {
            status,
            headers,
            json,
            text,
        }
    }

    pub async fn get_as(&self, uri: &str, user: &User) -> TestResponse {
        self.send(
            Request::get(uri)
                .header(header::AUTHORIZATION, self.bearer(user))
                .body(Body::empty())
                .unwrap(),
        )
        .await
    }

    pub async fn json_as(&self, method: &str, uri: &str, user: &User, body: Value) -> TestResponse {
        self.send(
            Request::builder()
                .method(method)
                .uri(uri)
                .header(header::AUTHORIZATION, self.bearer(user))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub json: Value,
    pub text: String,
}

impl TestResponse {
    pub fn location(&self) -> Option<&str> {
        self.headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
    }

    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    pub fn error_message(&self) -> &str {
        self.json["error"]["message"].as_str().unwrap_or_default()
    }
}
