use chrono::{Duration, Utc};
use studyhub::{
    access::{Access, Role},
    auth::{Session, SessionSource, SessionState},
    config::AppConfig,
    guard::{RenderGuard, RenderOutcome},
};
use uuid::Uuid;

fn signed_in(id: u128, role: &str) -> SessionState {
    let now = Utc::now();
    SessionState::Authenticated(Session {
        user_id: Uuid::from_u128(id),
        name: "Grace".to_string(),
        email: "grace@northside.test".to_string(),
        role: Some(role.to_string()),
        issued_at: now,
        expires_at: now + Duration::hours(1),
        source: SessionSource::Cookie,
    })
}

fn teacher_gate() -> RenderGuard {
    RenderGuard::new(
        Access::roles(&[Role::Teacher]),
        "/teacher",
        &AppConfig::default(),
    )
}

#[test]
fn test_loading_shows_indicator_and_renders_nothing() {
    let mut gate = teacher_gate();
    assert_eq!(gate.observe(&SessionState::Loading), RenderOutcome::Loading);
    assert!(!gate.has_rendered());
}

#[test]
fn test_renders_exactly_once_per_session() {
    let mut gate = teacher_gate();
    let session = signed_in(1, "teacher");

    assert_eq!(gate.observe(&SessionState::Loading), RenderOutcome::Loading);
    assert_eq!(gate.observe(&session), RenderOutcome::Render);
    assert_eq!(gate.observe(&session), RenderOutcome::Unchanged);
    assert_eq!(gate.observe(&session), RenderOutcome::Unchanged);
    assert!(gate.has_rendered());
}

#[test]
fn test_reloading_same_session_keeps_children() {
    let mut gate = teacher_gate();
    let session = signed_in(1, "teacher");

    assert_eq!(gate.observe(&session), RenderOutcome::Render);
    assert_eq!(gate.observe(&SessionState::Loading), RenderOutcome::Loading);
    assert_eq!(gate.observe(&SessionState::Loading), RenderOutcome::Loading);
    assert!(gate.has_rendered());
    assert_eq!(gate.observe(&session), RenderOutcome::Unchanged);

    // Loading followed by someone else still renders afresh.
    assert_eq!(gate.observe(&SessionState::Loading), RenderOutcome::Loading);
    assert_eq!(gate.observe(&signed_in(2, "teacher")), RenderOutcome::Render);
}

#[test]
fn test_new_identity_renders_again() {
    let mut gate = teacher_gate();
    assert_eq!(gate.observe(&signed_in(1, "teacher")), RenderOutcome::Render);
    assert_eq!(gate.observe(&signed_in(2, "teacher")), RenderOutcome::Render);
    // Same user, different role (after re-authentication) counts as a new session.
    assert_eq!(gate.observe(&signed_in(2, "admin")), RenderOutcome::Render);
}

#[test]
fn test_anonymous_redirects_to_sign_in() {
    let mut gate = teacher_gate();
    assert_eq!(
        gate.observe(&SessionState::Anonymous),
        RenderOutcome::Redirect("/auth/signin?callbackUrl=%2Fteacher".to_string())
    );
    assert!(!gate.has_rendered());
}

#[test]
fn test_wrong_role_redirects_to_dashboard() {
    let mut gate = teacher_gate();
    assert_eq!(
        gate.observe(&signed_in(3, "student")),
        RenderOutcome::Redirect("/dashboard".to_string())
    );
}

#[test]
fn test_sign_out_resets_render_state() {
    let mut gate = teacher_gate();
    let session = signed_in(1, "teacher");

    assert_eq!(gate.observe(&session), RenderOutcome::Render);
    assert!(matches!(
        gate.observe(&SessionState::Anonymous),
        RenderOutcome::Redirect(_)
    ));
    assert!(!gate.has_rendered());
    // Signing back in renders the children again.
    assert_eq!(gate.observe(&session), RenderOutcome::Render);
}

#[test]
fn test_admin_override_applies_to_render_guard() {
    let mut gate = teacher_gate();
    assert_eq!(gate.observe(&signed_in(9, "ADMIN")), RenderOutcome::Render);

    let config = AppConfig {
        admin_override: false,
        ..AppConfig::default()
    };
    let mut strict = RenderGuard::new(Access::roles(&[Role::Teacher]), "/teacher", &config);
    assert_eq!(
        strict.observe(&signed_in(9, "admin")),
        RenderOutcome::Redirect("/dashboard".to_string())
    );
}
