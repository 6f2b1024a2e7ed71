//! Identity provider backed by a hosted auth service (`/auth/v1/user`).

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use simulo_core::{AuthError, IdentityProvider, UserIdentity};

use crate::config::IdentityConfig;

pub struct HttpIdentityProvider {
    client: reqwest::Client,
    url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct UserResponse {
    id: String,
}

impl HttpIdentityProvider {
    pub fn new(config: &IdentityConfig) -> Self {
        HttpIdentityProvider {
            client: reqwest::Client::new(),
            url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn resolve_user(&self, token: &str) -> Result<UserIdentity, AuthError> {
        if token.is_empty() {
            return Err(AuthError::InvalidToken);
        }

        let response = self
            .client
            .get(format!("{}/auth/v1/user", self.url))
            .bearer_auth(token)
            .header("apikey", &self.api_key)
            .send()
            .await
            .map_err(|e| AuthError::Unavailable(e.to_string()))?;

        match response.status() {
            s if s.is_success() => {}
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(AuthError::InvalidToken),
            s => return Err(AuthError::Unavailable(format!("HTTP {}", s))),
        }

        let user: UserResponse = response
            .json()
            .await
            .map_err(|e| AuthError::Unavailable(format!("failed to parse user: {}", e)))?;

        Ok(UserIdentity { id: user.id })
    }
}
