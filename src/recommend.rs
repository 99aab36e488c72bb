//! AI study recommendations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{fmt::Write, sync::Arc};

use crate::{error::ApiError, models::StudyPlan};

/// At most this many recommendations are kept from one generation.
pub const MAX_RECOMMENDATIONS: usize = 5;

/// What the engine is told about a student.
#[derive(Debug, Clone, Default)]
pub struct StudentContext {
    pub name: String,
    pub plans: Vec<StudyPlan>,
    pub points: i64,
    pub streak: i64,
}

#[async_trait]
pub trait RecommendationEngine: Send + Sync {
    /// Returns short, self-contained suggestions, one per entry.
    async fn recommend(&self, student: &StudentContext) -> Result<Vec<String>, ApiError>;
}

pub type RecommenderState = Arc<dyn RecommendationEngine>;

pub fn build_prompt(student: &StudentContext) -> String {
    let mut prompt = format!(
        "You are a study coach. Suggest up to {MAX_RECOMMENDATIONS} concrete next steps for {}, one per line, no preamble.\n",
        student.name
    );
    let _ = writeln!(
        prompt,
        "Daily-goal points: {}, current streak: {} days.",
        student.points, student.streak
    );
    prompt.push_str("Study plans:\n");
    for plan in &student.plans {
        let _ = write!(
            prompt,
            "- {} ({}), {}% done, status {}",
            plan.title, plan.subject, plan.progress, plan.status
        );
        if let Some(target) = plan.target_date {
            let _ = write!(prompt, ", due {}", target);
        }
        prompt.push('\n');
    }
    prompt
}

/// parse_recommendations
///
/// One suggestion per non-empty line, list markers ("-", "*", "1.", "2)") stripped.
pub fn parse_recommendations(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            let line = line.trim();
            let line = line.trim_start_matches(['-', '*', '•']).trim_start();
            let digits = line.chars().take_while(char::is_ascii_digit).count();
            let rest = &line[digits..];
            if digits > 0 && (rest.starts_with('.') || rest.starts_with(')')) {
                rest[1..].trim().to_string()
            } else {
                line.to_string()
            }
        })
        .filter(|line| !line.is_empty())
        .take(MAX_RECOMMENDATIONS)
        .collect()
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: String,
}

/// HttpRecommendationEngine
///
/// Client for an OpenAI-compatible `chat/completions` endpoint.
#[derive(Clone)]
pub struct HttpRecommendationEngine {
    client: reqwest::Client,
    url: String,
    api_key: String,
    model: String,
}

impl HttpRecommendationEngine {
    pub fn new(url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl RecommendationEngine for HttpRecommendationEngine {
    async fn recommend(&self, student: &StudentContext) -> Result<Vec<String>, ApiError> {
        let prompt = build_prompt(student);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &prompt,
            }],
            temperature: 0.4,
        };

        let mut call = self.client.post(&self.url).json(&request);
        if !self.api_key.is_empty() {
            call = call.bearer_auth(&self.api_key);
        }

        let response = call.send().await?;
        if !response.status().is_success() {
            return Err(ApiError::Internal(format!(
                "recommendation engine returned {}",
                response.status()
            )));
        }

        let body = response.json::<ChatResponse>().await?;
        let text = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(parse_recommendations(&text))
    }
}
