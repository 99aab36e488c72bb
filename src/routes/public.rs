use crate::{
    AppState,
    handlers::{auth, pages, session},
};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. Nothing here returns another user's data.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        // GET /auth/signin
        // Where the page guard sends anonymous callers (with callbackUrl) and broken
        // sessions (with error=MissingRole|InvalidRole).
        .route("/auth/signin", get(pages::sign_in_page))
        // POST /api/auth/signup
        // Provider account + local student profile, then a session cookie.
        .route("/api/auth/signup", post(auth::sign_up))
        .route("/api/auth/signin", post(auth::sign_in))
        .route("/api/auth/signout", post(auth::sign_out))
        // GET /api/session
        // Current session or "unauthenticated"; never 401.
        .route("/api/session", get(session::get_session))
        // GET /api/session/gate?path=...&roles=...
        // Render-guard outcome for client-rendered pages.
        .route("/api/session/gate", get(session::session_gate))
}
