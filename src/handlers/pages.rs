//! Minimal server-rendered pages. The markup is a placeholder; what matters is which page a
//! caller is allowed to reach.

use axum::{extract::Query, response::Html};
use serde::Deserialize;

use crate::auth::AuthUser;

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn page(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><meta charset=\"utf-8\"><title>{} | StudyHub</title></head><body>{}</body></html>",
        escape(title),
        body
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInPageQuery {
    pub callback_url: Option<String>,
    pub error: Option<String>,
}

/// [Public Page] Sign-in form. Shows the reason code when a guard sent the caller here.
pub async fn sign_in_page(Query(query): Query<SignInPageQuery>) -> Html<String> {
    let mut body = String::from("<h1>Sign in</h1>");
    if let Some(error) = &query.error {
        body.push_str(&format!("<p class=\"error\" data-code=\"{0}\">{0}</p>", escape(error)));
    }
    let callback = query.callback_url.as_deref().unwrap_or("/dashboard");
    body.push_str(&format!(
        "<form method=\"post\" action=\"/api/auth/signin\" data-callback=\"{}\"></form>",
        escape(callback)
    ));
    page("Sign in", &body)
}

/// [Any Role] Landing page; links each role to its own area.
pub async fn dashboard(user: AuthUser) -> Html<String> {
    let body = format!(
        "<h1>Welcome, {}</h1><p>Role: {}</p><a href=\"{}\">Open your workspace</a> <a href=\"/leaderboard\">Leaderboard</a>",
        escape(&user.name),
        user.role,
        user.role.home_path()
    );
    page("Dashboard", &body)
}

/// [Student Page]
pub async fn student_home(user: AuthUser) -> Html<String> {
    page(
        "Student",
        &format!("<h1>Study plans for {}</h1>", escape(&user.name)),
    )
}

/// [Teacher Page]
pub async fn teacher_home(user: AuthUser) -> Html<String> {
    page("Teacher", &format!("<h1>Classes of {}</h1>", escape(&user.name)))
}

/// [Admin Page]
pub async fn admin_home(user: AuthUser) -> Html<String> {
    page(
        "Admin",
        &format!("<h1>Administration</h1><p>Signed in as {}</p>", escape(&user.email)),
    )
}

/// [Any Role]
pub async fn leaderboard_page(_user: AuthUser) -> Html<String> {
    page("Leaderboard", "<h1>Leaderboard</h1><div data-source=\"/api/leaderboard\"></div>")
}
