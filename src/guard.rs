//! The three access-control layers.
//!
//! - [`page_guard`]: page routes, answers with redirects.
//! - [`api_guard`]: API routes, answers with 401/403 envelopes.
//! - [`RenderGuard`]: client-driven rendering that waits for the session to load.
//!
//! All of them ask [`Policy::evaluate`] for the verdict and only differ in how they present it.

use axum::{
    extract::{FromRequestParts, OriginalUri, Request, State},
    http::{HeaderValue, header, request::Parts},
    middleware::Next,
    response::{Html, IntoResponse, Redirect, Response},
};
use reqwest::Url;
use uuid::Uuid;

use crate::{
    AppState,
    access::{Access, DenyReason, Policy, Role, Verdict},
    auth::{self, AuthUser, SessionSource, SessionState},
    config::AppConfig,
    error::ApiError,
};

/// GuardState
///
/// Router state of a guard layer: the application state plus the allow-list declared for the
/// routes behind it.
#[derive(Clone)]
pub struct GuardState {
    pub app: AppState,
    pub access: Access,
}

impl GuardState {
    pub fn new(app: AppState, access: Access) -> Self {
        Self { app, access }
    }
}

/// How a page responds to a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageDecision {
    Render,
    Loading,
    Redirect(String),
}

fn with_query(path: &str, pairs: &[(&str, &str)]) -> String {
    match Url::parse_with_params(&format!("http://localhost{path}"), pairs) {
        Ok(url) => match url.query() {
            Some(query) => format!("{}?{}", url.path(), query),
            None => url.path().to_string(),
        },
        Err(_) => path.to_string(),
    }
}

/// page_decision
///
/// - unauthenticated -> sign-in, remembering where the caller was going
/// - valid role not admitted -> the landing dashboard
/// - missing/unrecognised role -> sign-in with an `error` code, since the dashboard would
///   reject the same session again
pub fn page_decision(verdict: &Verdict, path: &str, config: &AppConfig) -> PageDecision {
    match verdict {
        Verdict::Pending => PageDecision::Loading,
        Verdict::Allowed(_) => PageDecision::Render,
        Verdict::Unauthenticated => PageDecision::Redirect(with_query(
            &config.sign_in_path,
            &[("callbackUrl", path)],
        )),
        Verdict::Denied(DenyReason::RoleNotPermitted(_)) => {
            PageDecision::Redirect(config.landing_path.clone())
        }
        Verdict::Denied(reason) => {
            PageDecision::Redirect(with_query(&config.sign_in_path, &[("error", reason.code())]))
        }
    }
}

/// api_decision
///
/// A session that has not finished loading has not proven an identity, so it is treated
/// like no session (401), never as a 403.
pub fn api_decision(verdict: &Verdict) -> Result<Role, ApiError> {
    match verdict {
        Verdict::Allowed(role) => Ok(*role),
        Verdict::Denied(reason) => Err(ApiError::Forbidden(reason.message())),
        Verdict::Pending | Verdict::Unauthenticated => Err(ApiError::Unauthenticated),
    }
}

fn request_path(parts: &Parts) -> String {
    let uri = parts
        .extensions
        .get::<OriginalUri>()
        .map(|original| &original.0)
        .unwrap_or(&parts.uri);
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

async fn session_of(parts: &mut Parts, app: &AppState) -> SessionState {
    match SessionState::from_request_parts(parts, app).await {
        Ok(state) => state,
        Err(never) => match never {},
    }
}

/// Writes a renewed session cookie onto the response when the session came from the cookie.
fn refresh_cookie(response: &mut Response, state: &SessionState, config: &AppConfig) {
    let Some(session) = state.session() else {
        return;
    };
    if session.source != SessionSource::Cookie {
        return;
    }

    match auth::refresh_token(session, config) {
        Ok(token) => {
            let cookie = auth::session_cookie(token, config);
            if let Ok(value) = HeaderValue::from_str(&cookie.to_string()) {
                response.headers_mut().append(header::SET_COOKIE, value);
            }
        }
        Err(e) => tracing::warn!("Session refresh failed: {}", e),
    }
}

/// page_guard
///
/// Middleware for page routers. Allowed requests run once with the resolved `AuthUser` in the
/// request extensions; everything else is redirected.
pub async fn page_guard(State(guard): State<GuardState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    let session = session_of(&mut parts, &guard.app).await;
    let config = &guard.app.config;
    let path = request_path(&parts);

    let verdict = Policy::new(config.admin_override).evaluate(&session, &guard.access);
    tracing::debug!(
        path = %path,
        verdict = verdict.label(),
        role = ?session.session().and_then(|s| s.role.clone()),
        "page guard"
    );

    match page_decision(&verdict, &path, config) {
        PageDecision::Render => {
            if let (Verdict::Allowed(role), Some(s)) = (&verdict, session.session()) {
                parts.extensions.insert(AuthUser::from_session(s, *role));
            }
            let mut response = next.run(Request::from_parts(parts, body)).await;
            refresh_cookie(&mut response, &session, config);
            response
        }
        PageDecision::Loading => Html(LOADING_SHELL).into_response(),
        PageDecision::Redirect(location) => {
            tracing::info!(path = %path, location = %location, "page guard redirect");
            Redirect::to(&location).into_response()
        }
    }
}

/// api_guard
///
/// Middleware for API routers: 401 without a session, 403 for a role outside the allow-list.
pub async fn api_guard(State(guard): State<GuardState>, request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();
    let session = session_of(&mut parts, &guard.app).await;
    let config = &guard.app.config;

    let verdict = Policy::new(config.admin_override).evaluate(&session, &guard.access);
    tracing::debug!(
        path = %parts.uri.path(),
        verdict = verdict.label(),
        role = ?session.session().and_then(|s| s.role.clone()),
        "api guard"
    );

    match api_decision(&verdict) {
        Ok(role) => {
            if let Some(s) = session.session() {
                parts.extensions.insert(AuthUser::from_session(s, role));
            }
            let mut response = next.run(Request::from_parts(parts, body)).await;
            refresh_cookie(&mut response, &session, config);
            response
        }
        Err(err) => err.into_response(),
    }
}

const LOADING_SHELL: &str = "<!doctype html><html><body><p>Loading…</p></body></html>";

/// What a client-rendered component should show after observing the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Session still resolving: show the loading indicator, do nothing else.
    Loading,
    /// First confirmed observation for this session: render the children.
    Render,
    /// Children already rendered for this exact session: keep them, no re-check.
    Unchanged,
    Redirect(String),
}

/// RenderGuard
///
/// Withholds protected children until the session is confirmed, then renders them once per
/// resolved session (identity + role). A different session, or losing the session, resets it;
/// a `Loading` state in between does not.
#[derive(Debug, Clone)]
pub struct RenderGuard {
    access: Access,
    policy: Policy,
    path: String,
    config: AppConfig,
    rendered_for: Option<(Uuid, Option<String>)>,
}

impl RenderGuard {
    pub fn new(access: Access, path: impl Into<String>, config: &AppConfig) -> Self {
        Self {
            access,
            policy: Policy::new(config.admin_override),
            path: path.into(),
            config: config.clone(),
            rendered_for: None,
        }
    }

    pub fn observe(&mut self, state: &SessionState) -> RenderOutcome {
        let verdict = self.policy.evaluate(state, &self.access);
        match page_decision(&verdict, &self.path, &self.config) {
            PageDecision::Render => {
                let key = state.session().map(|s| (s.user_id, s.role.clone()));
                if key.is_some() && self.rendered_for == key {
                    RenderOutcome::Unchanged
                } else {
                    self.rendered_for = key;
                    RenderOutcome::Render
                }
            }
            // A re-poll of the same session keeps what was rendered.
            PageDecision::Loading => RenderOutcome::Loading,
            PageDecision::Redirect(location) => {
                self.rendered_for = None;
                RenderOutcome::Redirect(location)
            }
        }
    }

    pub fn has_rendered(&self) -> bool {
        self.rendered_for.is_some()
    }
}
