//! Caller identification
//!
//! Requests arrive with an `x-user-id` header set by the platform's edge
//! proxy after authentication. The extractor rejects requests without a
//! well-formed user id before any handler logic runs.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use uuid::Uuid;

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";

/// Authenticated caller, extracted from request headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub user_id: Uuid,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Caller
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Validation(format!("missing {USER_ID_HEADER} header")))?;

        let text = value
            .to_str()
            .map_err(|_| ApiError::Validation(format!("malformed {USER_ID_HEADER} header")))?;

        let user_id = Uuid::parse_str(text)
            .map_err(|_| ApiError::Validation(format!("malformed {USER_ID_HEADER} header")))?;

        Ok(Caller { user_id })
    }
}
