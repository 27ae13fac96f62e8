//! Actor resolution. Identity verification lives upstream; this boundary
//! trusts the `x-user-id` header the identity layer injects and resolves
//! it to a stored user.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use forge_core::ids::UserId;
use forge_store::users::{UserRepo, UserRow};
use forge_store::StoreError;

use crate::error::ApiError;
use crate::server::AppState;

pub const USER_HEADER: &str = "x-user-id";

/// The authenticated user for the current request.
pub struct Actor(pub UserRow);

impl FromRequestParts<AppState> for Actor {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::unauthorized(format!("missing {USER_HEADER} header")))?;

        let repo = UserRepo::new(state.db.clone());
        match repo.get(&UserId::from_raw(raw)) {
            Ok(user) if user.is_active => Ok(Actor(user)),
            Ok(_) => Err(ApiError::unauthorized("user is inactive")),
            Err(StoreError::NotFound(_)) => Err(ApiError::unauthorized("unknown user")),
            Err(e) => Err(ApiError::from(e)),
        }
    }
}
