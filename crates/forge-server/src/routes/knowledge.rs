use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;

use forge_core::ids::KnowledgeId;
use forge_core::types::KnowledgeCategory;
use forge_store::knowledge::{KnowledgeRepo, KnowledgeRow, NewKnowledgeItem};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::routes::default_limit;
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/knowledge", get(list).post(create))
        .route("/knowledge/search", get(search))
        .route("/knowledge/{id}/approve", put(approve))
        .route("/knowledge/{id}/increment-usage", put(increment_usage))
}

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    skip: u32,
    #[serde(default = "default_limit")]
    limit: u32,
    category: Option<KnowledgeCategory>,
    industry: Option<String>,
    #[serde(default = "default_true")]
    approved_only: bool,
}

#[derive(Debug, Deserialize)]
struct SearchParams {
    q: String,
    category: Option<KnowledgeCategory>,
    industry: Option<String>,
}

fn default_true() -> bool {
    true
}

async fn create(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<NewKnowledgeItem>,
) -> Result<Json<KnowledgeRow>, ApiError> {
    let repo = KnowledgeRepo::new(state.db.clone());
    Ok(Json(repo.create(&input, &actor.0.id)?))
}

async fn list(
    State(state): State<AppState>,
    _actor: Actor,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<KnowledgeRow>>, ApiError> {
    let repo = KnowledgeRepo::new(state.db.clone());
    let items = repo.list(
        params.category,
        params.industry.as_deref(),
        params.approved_only,
        params.limit,
        params.skip,
    )?;
    Ok(Json(items))
}

async fn search(
    State(state): State<AppState>,
    _actor: Actor,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<KnowledgeRow>>, ApiError> {
    let repo = KnowledgeRepo::new(state.db.clone());
    let items = repo.search(&params.q, params.category, params.industry.as_deref())?;
    Ok(Json(items))
}

async fn approve(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<KnowledgeId>,
) -> Result<Json<KnowledgeRow>, ApiError> {
    let repo = KnowledgeRepo::new(state.db.clone());
    Ok(Json(repo.approve(&id, &actor.0.id)?))
}

async fn increment_usage(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<KnowledgeId>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let repo = KnowledgeRepo::new(state.db.clone());
    let usage_count = repo.increment_usage(&id)?;
    Ok(Json(serde_json::json!({ "usage_count": usage_count })))
}
