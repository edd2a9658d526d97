//! Caller identity.
//!
//! Authentication happens upstream; the gateway forwards the resolved user
//! id in `X-User-Id`.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use devtrack_core::api::client::USER_ID_HEADER;

use super::error::ServerError;

/// The authenticated user id of the request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|user| !user.is_empty())
            .map(|user| AuthUser(user.to_string()))
            .ok_or(ServerError::Unauthorized)
    }
}
