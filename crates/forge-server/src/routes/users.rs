use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use forge_store::users::{UserRepo, UserRow};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(create_user))
        .route("/users/me", get(me))
}

/// Provisioning input. The credential arrives pre-hashed from the
/// identity layer; it is stored verbatim and never served back.
#[derive(Debug, Deserialize)]
struct NewUser {
    email: String,
    name: String,
    password_hash: String,
}

async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<NewUser>,
) -> Result<Json<UserRow>, ApiError> {
    let repo = UserRepo::new(state.db.clone());
    let user = repo.create(&input.email, &input.name, &input.password_hash)?;
    Ok(Json(user))
}

async fn me(actor: Actor) -> Json<UserRow> {
    Json(actor.0)
}
