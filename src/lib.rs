use axum::{Router, extract::FromRef, http::HeaderName};
use tower_cookies::CookieManagerLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Authorization core: roles, allow-lists and the single policy evaluation.
pub mod access;
// Session tokens, cookies and the session/identity extractors.
pub mod auth;
pub mod config;
pub mod error;
// Json/Path/Query with rejections mapped into the error envelope.
pub mod extract;
// Page, API and render guards built on `access::Policy`.
pub mod guard;
pub mod handlers;
pub mod models;

// Backing services, each behind a trait object in `AppState`.
pub mod documents;
pub mod provider;
pub mod recommend;
pub mod repository;

// Feature services over the document store.
pub mod goals;
pub mod leaderboard;

// Routers split by audience (public, pages, any role, student, teacher, admin).
pub mod routes;
use routes::{admin, authenticated, pages, public, student, teacher};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use documents::{DocumentState, MemoryDocumentStore, PgDocumentStore};
pub use provider::{AuthProviderState, SupabaseAuthProvider};
pub use recommend::{HttpRecommendationEngine, RecommenderState};
pub use repository::{PostgresRepository, RepositoryState};

/// ApiDoc
///
/// OpenAPI description of every JSON route, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::sign_up, handlers::auth::sign_in, handlers::auth::sign_out,
        handlers::session::get_session, handlers::session::session_gate, handlers::session::get_me,
        handlers::leaderboard::get_leaderboard, handlers::leaderboard::get_my_rank,
        handlers::goals::list_goals, handlers::goals::create_goal, handlers::goals::class_feed,
        handlers::goals::complete_goal, handlers::goals::cheer_goal, handlers::goals::delete_goal,
        handlers::student::list_study_plans, handlers::student::create_study_plan,
        handlers::student::get_study_plan, handlers::student::update_study_plan,
        handlers::student::delete_study_plan, handlers::student::list_recommendations,
        handlers::student::generate_recommendations,
        handlers::teacher::list_students, handlers::teacher::student_study_plans,
        handlers::teacher::add_recommendation,
        handlers::admin::get_admin_stats, handlers::admin::list_users,
        handlers::admin::update_user_role, handlers::admin::delete_user
    ),
    components(
        schemas(
            access::Role, models::User, models::UserProfile, models::StudyPlan,
            models::StudyPlanStatus, models::Recommendation, models::SignUpRequest,
            models::SignInRequest, models::CreateStudyPlanRequest, models::UpdateStudyPlanRequest,
            models::CreateRecommendationRequest, models::UpdateRoleRequest,
            models::CreateGoalRequest, models::SessionView, models::SessionUser,
            models::AdminStats, models::StudentOverview, models::LeaderboardEntry,
            models::RankedEntry, models::LeaderboardPage, models::DailyGoal, models::GoalCheer,
            models::AuthResponse, models::GateView, models::Deleted, models::MyRank,
        )
    ),
    tags(
        (name = "studyhub", description = "StudyHub learning-management API")
    )
)]
pub struct ApiDoc;

/// AppState
///
/// The single shared container of services and configuration, cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// Relational system of record (profiles, study plans, recommendations).
    pub repo: RepositoryState,
    /// Leaderboard, daily goals and cheers.
    pub docs: DocumentState,
    /// External identity service for passwords.
    pub auth: AuthProviderState,
    pub recommender: RecommenderState,
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for DocumentState {
    fn from_ref(app_state: &AppState) -> DocumentState {
        app_state.docs.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// create_router
///
/// Assembles every router with its guard layer, then the global layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(pages::page_routes(&state))
        .merge(authenticated::authenticated_routes(&state))
        .merge(student::student_routes(&state))
        .merge(teacher::teacher_routes(&state))
        .merge(admin::admin_routes(&state))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id))
                // Sign-in / sign-out write the session cookie through `Cookies`.
                .layer(CookieManagerLayer::new()),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for one request, tagged with its `x-request-id` so every log line of the request can
/// be correlated.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
