use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Rejected by auth provider: {0}")]
    Rejected(String),

    #[error("Auth provider unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected auth provider response")]
    Malformed,
}

impl From<ProviderError> for ApiError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::InvalidCredentials => ApiError::Unauthenticated,
            ProviderError::Rejected(msg) => ApiError::Validation(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// AuthProvider
///
/// The external identity service. It owns passwords; this service only keeps the profile
/// keyed by the id the provider hands back.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid, ProviderError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Uuid, ProviderError>;
}

pub type AuthProviderState = Arc<dyn AuthProvider>;

#[derive(Deserialize)]
struct ProviderUser {
    id: Uuid,
}

// Sign-up answers with the bare user, or with a session wrapping it when confirmation is off.
#[derive(Deserialize)]
struct SignUpResponse {
    id: Option<Uuid>,
    user: Option<ProviderUser>,
}

impl SignUpResponse {
    fn user_id(self) -> Result<Uuid, ProviderError> {
        self.user
            .map(|u| u.id)
            .or(self.id)
            .ok_or(ProviderError::Malformed)
    }
}

// Any 4xx on the password grant means the credentials were not accepted.
fn check_sign_in_status(status: StatusCode) -> Result<(), ProviderError> {
    if status.is_client_error() {
        return Err(ProviderError::InvalidCredentials);
    }
    if !status.is_success() {
        return Err(ProviderError::Rejected(format!("status {}", status)));
    }
    Ok(())
}

#[derive(Deserialize)]
struct TokenResponse {
    user: ProviderUser,
}

#[derive(Deserialize, Default)]
struct ProviderErrorBody {
    msg: Option<String>,
    error_description: Option<String>,
    message: Option<String>,
}

impl ProviderErrorBody {
    fn into_message(self) -> String {
        self.msg
            .or(self.error_description)
            .or(self.message)
            .unwrap_or_else(|| "request rejected".to_string())
    }
}

/// SupabaseAuthProvider
///
/// Talks to a Supabase-compatible `/auth/v1` REST API.
#[derive(Clone)]
pub struct SupabaseAuthProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SupabaseAuthProvider {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuthProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<Uuid, ProviderError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/signup", self.base_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        if !response.status().is_success() {
            // e.g. email already registered, weak password
            let body = response.json::<ProviderErrorBody>().await.unwrap_or_default();
            return Err(ProviderError::Rejected(body.into_message()));
        }

        response.json::<SignUpResponse>().await?.user_id()
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Uuid, ProviderError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/token?grant_type=password", self.base_url))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await?;

        check_sign_in_status(response.status())?;

        let body = response.json::<TokenResponse>().await?;
        Ok(body.user.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sign_up_reads_bare_or_wrapped_user() {
        let id = Uuid::new_v4();

        let bare: SignUpResponse = serde_json::from_value(json!({ "id": id, "email": "a@b.test" })).unwrap();
        assert_eq!(bare.user_id().unwrap(), id);

        let wrapped: SignUpResponse = serde_json::from_value(json!({
            "access_token": "t",
            "user": { "id": id }
        }))
        .unwrap();
        assert_eq!(wrapped.user_id().unwrap(), id);

        let empty: SignUpResponse = serde_json::from_value(json!({ "session": null })).unwrap();
        assert!(matches!(empty.user_id(), Err(ProviderError::Malformed)));
    }

    #[test]
    fn error_message_prefers_msg() {
        let body: ProviderErrorBody = serde_json::from_value(json!({
            "msg": "User already registered",
            "error_description": "ignored",
            "message": "ignored too"
        }))
        .unwrap();
        assert_eq!(body.into_message(), "User already registered");

        let body: ProviderErrorBody =
            serde_json::from_value(json!({ "message": "Password should be at least 6 characters" }))
                .unwrap();
        assert_eq!(body.into_message(), "Password should be at least 6 characters");

        assert_eq!(ProviderErrorBody::default().into_message(), "request rejected");
    }

    #[test]
    fn sign_in_status_mapping() {
        assert!(check_sign_in_status(StatusCode::OK).is_ok());
        assert!(matches!(
            check_sign_in_status(StatusCode::BAD_REQUEST),
            Err(ProviderError::InvalidCredentials)
        ));
        assert!(matches!(
            check_sign_in_status(StatusCode::UNPROCESSABLE_ENTITY),
            Err(ProviderError::InvalidCredentials)
        ));
        assert!(matches!(
            check_sign_in_status(StatusCode::BAD_GATEWAY),
            Err(ProviderError::Rejected(_))
        ));
    }

    #[test]
    fn provider_errors_become_api_errors() {
        assert_eq!(ApiError::from(ProviderError::InvalidCredentials), ApiError::Unauthenticated);
        assert_eq!(
            ApiError::from(ProviderError::Rejected("weak password".to_string())),
            ApiError::Validation("weak password".to_string())
        );
        assert!(matches!(ApiError::from(ProviderError::Malformed), ApiError::Internal(_)));
    }
}
