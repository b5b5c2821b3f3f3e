// crates/server/src/routes/secrets.rs
//! Secret administration.
//!
//! - GET    /admin/secrets — List keys, optionally filtered by `query`
//! - POST   /admin/secrets — Create a secret from key parts
//! - GET    /admin/secrets/{*key} — Read one secret
//! - PUT    /admin/secrets/{*key} — Create or replace a secret
//! - DELETE /admin/secrets/{*key} — Remove a secret
//!
//! Every backend failure surfaces as a 503 with the backend's message; nothing
//! is partially written.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::identity::CurrentUser;
use crate::metrics::record_secret_request;
use crate::secrets::{
    generate_secret_key, parse_secret_key, SecretAttributes, SecretError, SecretKeyParts,
    SecretRecord, SECRET_KEY_PARTS,
};
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(Deserialize))]
pub struct SecretListResponse {
    pub keys: Vec<String>,
    /// Names of the key components, so clients can build the search form.
    pub key_parts: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateSecretRequest {
    #[serde(flatten)]
    pub parts: SecretKeyParts,
    #[serde(flatten)]
    pub attributes: SecretAttributes,
}

#[derive(Debug, Deserialize)]
pub struct ReadParams {
    /// Include the value even when the secret is not marked visible.
    #[serde(default)]
    pub reveal: bool,
}

/// Substring filter, accepted as `query` or the form-style `search[query]`.
fn search_query(params: &HashMap<String, String>) -> Option<&str> {
    params
        .get("search[query]")
        .or_else(|| params.get("query"))
        .map(|q| q.trim())
        .filter(|q| !q.is_empty())
}

fn outcome(error: &ApiError) -> &'static str {
    match error {
        ApiError::Secrets(SecretError::BackendUnavailable(_)) => "unavailable",
        ApiError::SecretNotFound(_) => "not_found",
        _ => "rejected",
    }
}

fn recorded<T>(action: &'static str, result: ApiResult<T>) -> ApiResult<T> {
    match &result {
        Ok(_) => record_secret_request(action, "ok"),
        Err(e) => record_secret_request(action, outcome(e)),
    }
    result
}

/// GET /api/admin/secrets — List secret keys.
async fn list_secrets(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Json<SecretListResponse>> {
    let result = async {
        let mut keys = state.secrets.list_keys().await?;
        if let Some(query) = search_query(&params) {
            keys.retain(|key| key.contains(query));
        }
        Ok::<_, ApiError>(Json(SecretListResponse {
            keys,
            key_parts: SECRET_KEY_PARTS.iter().map(|p| p.to_string()).collect(),
        }))
    }
    .await;
    recorded("list", result)
}

/// GET /api/admin/secrets/{*key} — Read one secret.
async fn read_secret(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    Query(params): Query<ReadParams>,
) -> ApiResult<Json<SecretRecord>> {
    let result = async {
        parse_secret_key(&key)?;
        let record = state
            .secrets
            .read(&key)
            .await?
            .ok_or_else(|| ApiError::SecretNotFound(key.clone()))?;
        Ok::<_, ApiError>(Json(if params.reveal { record } else { record.redacted() }))
    }
    .await;
    recorded("read", result)
}

async fn write(
    state: &AppState,
    key: &str,
    mut attributes: SecretAttributes,
    user: &CurrentUser,
) -> ApiResult<()> {
    parse_secret_key(key)?;
    if attributes.value.is_empty() {
        return Err(ApiError::Unprocessable("value must not be empty".to_string()));
    }
    attributes.user_id = user.id;

    if !state.secrets.write(key, attributes).await? {
        return Err(ApiError::Unprocessable(format!("backend refused {key}")));
    }
    tracing::info!(key = %key, user_id = user.id, "secret saved");
    Ok(())
}

/// PUT /api/admin/secrets/{*key} — Create or replace a secret.
async fn put_secret(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    user: CurrentUser,
    Json(attributes): Json<SecretAttributes>,
) -> ApiResult<StatusCode> {
    let result = write(&state, &key, attributes, &user).await;
    recorded("write", result.map(|()| StatusCode::NO_CONTENT))
}

/// POST /api/admin/secrets — Create a secret from its key parts.
async fn create_secret(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(request): Json<CreateSecretRequest>,
) -> ApiResult<(StatusCode, Json<SecretRecord>)> {
    let result = async {
        let key = generate_secret_key(&request.parts)?;
        write(&state, &key, request.attributes, &user).await?;
        let record = state
            .secrets
            .read(&key)
            .await?
            .ok_or_else(|| ApiError::Internal(format!("{key} missing after write")))?;
        Ok::<_, ApiError>((StatusCode::CREATED, Json(record.redacted())))
    }
    .await;
    recorded("write", result)
}

/// DELETE /api/admin/secrets/{*key} — Remove a secret.
async fn delete_secret(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
    user: CurrentUser,
) -> ApiResult<StatusCode> {
    let result = async {
        parse_secret_key(&key)?;
        state.secrets.delete(&key).await?;
        tracing::info!(key = %key, user_id = user.id, "secret deleted");
        Ok::<_, ApiError>(StatusCode::NO_CONTENT)
    }
    .await;
    recorded("delete", result)
}

/// Build the secrets router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/secrets", get(list_secrets).post(create_secret))
        .route(
            "/admin/secrets/{*key}",
            get(read_secret).put(put_secret).delete(delete_secret),
        )
}
