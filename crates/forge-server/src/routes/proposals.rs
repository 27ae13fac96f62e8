use axum::extract::{Path, Query, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use serde::Deserialize;

use forge_core::ids::{ApprovalId, CommentId, OrgId, ProposalId, SectionId};
use forge_core::types::ProposalStatus;
use forge_store::activities::{ActivityRepo, ActivityRow};
use forge_store::approvals::{ApprovalRepo, ApprovalRow};
use forge_store::attachments::{AttachmentRepo, AttachmentRow, NewAttachment};
use forge_store::comments::{CommentRepo, CommentRow, NewComment};
use forge_store::proposals::{NewProposal, ProposalDetail, ProposalPatch, ProposalRepo, ProposalRow};
use forge_store::sections::{NewSection, SectionPatch, SectionRepo, SectionRow};

use crate::auth::Actor;
use crate::error::ApiError;
use crate::routes::default_limit;
use crate::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/proposals", get(list).post(create))
        .route("/proposals/{id}", get(get_one).put(update))
        .route(
            "/proposals/{id}/sections",
            get(list_sections).post(create_section),
        )
        .route("/proposals/{id}/sections/{section_id}", put(update_section))
        .route("/proposals/{id}/activities", get(list_activities))
        .route(
            "/proposals/{id}/comments",
            get(list_comments).post(create_comment),
        )
        .route("/comments/{id}/resolve", put(resolve_comment))
        .route(
            "/proposals/{id}/approvals",
            get(list_approvals).post(request_approval),
        )
        .route("/approvals/{id}/respond", put(respond_approval))
        .route(
            "/proposals/{id}/attachments",
            get(list_attachments).post(add_attachment),
        )
}

// ── Proposals ──

#[derive(Debug, Deserialize)]
struct ListParams {
    #[serde(default)]
    skip: u32,
    #[serde(default = "default_limit")]
    limit: u32,
    status: Option<ProposalStatus>,
    organization_id: Option<OrgId>,
}

async fn create(
    State(state): State<AppState>,
    actor: Actor,
    Json(input): Json<NewProposal>,
) -> Result<Json<ProposalDetail>, ApiError> {
    let repo = ProposalRepo::new(state.db.clone());
    Ok(Json(repo.create(&input, &actor.0.id)?))
}

async fn list(
    State(state): State<AppState>,
    _actor: Actor,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ProposalRow>>, ApiError> {
    let repo = ProposalRepo::new(state.db.clone());
    let proposals = repo.list(
        params.status,
        params.organization_id.as_ref(),
        params.limit,
        params.skip,
    )?;
    Ok(Json(proposals))
}

async fn get_one(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<ProposalId>,
) -> Result<Json<ProposalDetail>, ApiError> {
    let repo = ProposalRepo::new(state.db.clone());
    Ok(Json(repo.get_detail(&id)?))
}

async fn update(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<ProposalId>,
    Json(patch): Json<ProposalPatch>,
) -> Result<Json<ProposalDetail>, ApiError> {
    let repo = ProposalRepo::new(state.db.clone());
    Ok(Json(repo.update(&id, &patch, &actor.0.id)?))
}

// ── Sections ──

async fn create_section(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<ProposalId>,
    Json(input): Json<NewSection>,
) -> Result<Json<SectionRow>, ApiError> {
    let repo = SectionRepo::new(state.db.clone());
    Ok(Json(repo.create(&id, &input, &actor.0.id)?))
}

async fn list_sections(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<ProposalId>,
) -> Result<Json<Vec<SectionRow>>, ApiError> {
    let repo = SectionRepo::new(state.db.clone());
    Ok(Json(repo.list(&id)?))
}

async fn update_section(
    State(state): State<AppState>,
    actor: Actor,
    Path((id, section_id)): Path<(ProposalId, SectionId)>,
    Json(patch): Json<SectionPatch>,
) -> Result<Json<SectionRow>, ApiError> {
    let repo = SectionRepo::new(state.db.clone());
    Ok(Json(repo.update(&id, &section_id, &patch, &actor.0.id)?))
}

// ── Activities ──

async fn list_activities(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<ProposalId>,
) -> Result<Json<Vec<ActivityRow>>, ApiError> {
    let repo = ActivityRepo::new(state.db.clone());
    Ok(Json(repo.list_for_proposal(&id)?))
}

// ── Comments ──

#[derive(Debug, Deserialize)]
struct CommentListParams {
    section_id: Option<SectionId>,
}

#[derive(Debug, Deserialize)]
struct ResolveRequest {
    resolved: bool,
}

async fn create_comment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<ProposalId>,
    Json(input): Json<NewComment>,
) -> Result<Json<CommentRow>, ApiError> {
    let repo = CommentRepo::new(state.db.clone());
    Ok(Json(repo.create(&id, &input, &actor.0.id)?))
}

async fn list_comments(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<ProposalId>,
    Query(params): Query<CommentListParams>,
) -> Result<Json<Vec<CommentRow>>, ApiError> {
    let repo = CommentRepo::new(state.db.clone());
    Ok(Json(repo.list(&id, params.section_id.as_ref())?))
}

async fn resolve_comment(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<CommentId>,
    Json(request): Json<ResolveRequest>,
) -> Result<Json<CommentRow>, ApiError> {
    let repo = CommentRepo::new(state.db.clone());
    Ok(Json(repo.resolve(&id, request.resolved)?))
}

// ── Approvals ──

#[derive(Debug, Deserialize)]
struct NewApprovalRequest {
    approver_role: String,
}

#[derive(Debug, Deserialize)]
struct ApprovalResponseRequest {
    approved: bool,
    #[serde(default)]
    comments: Option<String>,
}

async fn request_approval(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<ProposalId>,
    Json(input): Json<NewApprovalRequest>,
) -> Result<Json<ApprovalRow>, ApiError> {
    let repo = ApprovalRepo::new(state.db.clone());
    Ok(Json(repo.request(&id, &input.approver_role, &actor.0.id)?))
}

async fn list_approvals(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<ProposalId>,
) -> Result<Json<Vec<ApprovalRow>>, ApiError> {
    let repo = ApprovalRepo::new(state.db.clone());
    Ok(Json(repo.list_for_proposal(&id)?))
}

async fn respond_approval(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<ApprovalId>,
    Json(input): Json<ApprovalResponseRequest>,
) -> Result<Json<ApprovalRow>, ApiError> {
    let repo = ApprovalRepo::new(state.db.clone());
    Ok(Json(repo.respond(&id, input.approved, input.comments.as_deref())?))
}

// ── Attachments ──

async fn add_attachment(
    State(state): State<AppState>,
    actor: Actor,
    Path(id): Path<ProposalId>,
    Json(input): Json<NewAttachment>,
) -> Result<Json<AttachmentRow>, ApiError> {
    let repo = AttachmentRepo::new(state.db.clone());
    Ok(Json(repo.add(&id, &input, &actor.0.id)?))
}

async fn list_attachments(
    State(state): State<AppState>,
    _actor: Actor,
    Path(id): Path<ProposalId>,
) -> Result<Json<Vec<AttachmentRow>>, ApiError> {
    let repo = AttachmentRepo::new(state.db.clone());
    Ok(Json(repo.list_for_proposal(&id)?))
}
