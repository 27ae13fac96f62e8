use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use forge_core::ids::OrgId;
use forge_store::organizations::{NewOrganization, OrgRepo, OrgRow};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::routes::default_limit;
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/organizations", get(list).post(create))
        .route("/organizations/{id}", get(get_one))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    skip: u32,
    #[serde(default = "default_limit")]
    limit: u32,
}

async fn create(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<NewOrganization>,
) -> Result<Json<OrgRow>, ApiError> {
    let repo = OrgRepo::new(state.db.clone());
    let org = repo.create(&input, &actor.0.id)?;
    Ok(Json(org))
}

async fn list(
    State(state): State<AppState>,
    _actor: Actor,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<OrgRow>>, ApiError> {
    let repo = OrgRepo::new(state.db.clone());
    Ok(Json(repo.list(params.limit, params.skip)?))
}

async fn get_one(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<OrgId>,
) -> Result<Json<OrgRow>, ApiError> {
    let repo = OrgRepo::new(state.db.clone());
    Ok(Json(repo.get(&id)?))
}
