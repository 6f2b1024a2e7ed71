//! HTTP endpoints next to the session socket.
//!
//! - `POST /projects/{id}/agent`: generate, compile and deploy a program
//!   from a natural-language prompt (multipart field `prompt`).
//! - `GET /objects/{key}`: serve an object behind a presigned URL.

use std::sync::Arc;
use std::time::SystemTime;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use simulo_core::AuthError;
use tracing::{error, info, warn};

use crate::deploy::DeployError;
use crate::server::AppState;

/// Longest accepted prompt, in bytes.
pub const MAX_PROMPT_LEN: usize = 2000;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    Forbidden,
    NotFound(String),
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Forbidden".to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => {
                error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, message).into_response()
    }
}

impl From<DeployError> for ApiError {
    fn from(e: DeployError) -> Self {
        match e {
            DeployError::ProjectNotFound(id) => ApiError::NotFound(format!("Project {} not found", id)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

/// Bearer token from the `Authorization` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
    (!token.is_empty()).then_some(token)
}

struct AgentForm {
    prompt: String,
    rewrite: bool,
}

async fn read_agent_form(mut multipart: Multipart) -> Result<AgentForm, ApiError> {
    let mut prompt = None;
    let mut rewrite = true;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Bad request: {}", e)))?
    {
        let name = field.name().map(str::to_string);
        let value = field
            .text()
            .await
            .map_err(|e| ApiError::BadRequest(format!("Bad request: {}", e)))?;

        match name.as_deref() {
            Some("prompt") => prompt = Some(value),
            Some("rewrite") => rewrite = value != "false",
            _ => {}
        }
    }

    let prompt = prompt.unwrap_or_default();
    if prompt.is_empty() {
        return Err(ApiError::BadRequest("No prompt provided".into()));
    }
    if prompt.len() > MAX_PROMPT_LEN {
        return Err(ApiError::BadRequest("Prompt too long".into()));
    }
    Ok(AgentForm { prompt, rewrite })
}

pub async fn agent(
    State(state): State<Arc<AppState>>,
    Path(project_id): Path<String>,
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let token = bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    let user = state.identity.resolve_user(token).await.map_err(|e| match e {
        AuthError::InvalidToken => ApiError::Unauthorized,
        AuthError::Unavailable(cause) => ApiError::Internal(cause),
    })?;

    let form = read_agent_form(multipart).await?;

    let project = state.projects.get_project(&project_id).await.map_err(|e| {
        if e.is_not_found() {
            ApiError::NotFound(format!("Project {} not found", project_id))
        } else {
            ApiError::Internal(e.to_string())
        }
    })?;
    if project.owner != user.id {
        warn!(user = %user.id, project_id = %project_id, "agent request for foreign project");
        return Err(ApiError::Forbidden);
    }

    info!(user = %user.id, project_id = %project_id, "agent request");
    let outcome = state
        .deployer
        .deploy(&project_id, &form.prompt, form.rewrite)
        .await?;
    info!(project_id = %project_id, artifact = %outcome.artifact_key, "agent request deployed");

    Ok((StatusCode::OK, "OK"))
}

#[derive(Debug, Deserialize)]
pub struct SignedQuery {
    expires: u64,
    signature: String,
}

pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(query): Query<SignedQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let store = state
        .object_files
        .as_ref()
        .ok_or_else(|| ApiError::NotFound("Not found".into()))?;

    let data = store
        .read_signed(&key, query.expires, &query.signature, SystemTime::now())
        .await
        .map_err(|_| ApiError::NotFound("Not found".into()))?;

    Ok(([(header::CONTENT_TYPE, "application/octet-stream")], data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_token_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert_eq!(bearer_token(&headers), Some("abc"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("raw"));
        assert_eq!(bearer_token(&headers), Some("raw"));

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(bearer_token(&headers), None);
    }
}
