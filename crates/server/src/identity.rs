// crates/server/src/identity.rs
//! Viewer identity as forwarded by the authenticating proxy.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use livewatch_stream::{Viewer, ViewerId};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// The authenticated user making the request.
///
/// Authentication happens upstream; this only reads the identity headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub id: ViewerId,
    pub name: String,
}

impl CurrentUser {
    pub fn viewer(&self) -> Viewer {
        Viewer::new(self.id, self.name.clone())
    }
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let id = header(USER_ID_HEADER)
            .and_then(|v| v.parse::<ViewerId>().ok())
            .ok_or(ApiError::Unauthenticated)?;
        let name = header(USER_NAME_HEADER)
            .map(str::to_string)
            .unwrap_or_else(|| format!("user-{id}"));

        Ok(CurrentUser { id, name })
    }
}
