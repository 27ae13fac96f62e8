use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use forge_core::ids::{OrgId, ProposalId, UserId};
use forge_core::tags;
use forge_core::types::{Priority, ProposalStatus};

use crate::activities;
use crate::database::Database;
use crate::error::StoreError;
use crate::organizations::{self, OrgRow};
use crate::row_helpers;
use crate::users::{self, UserRow};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProposalRow {
    pub id: ProposalId,
    pub title: String,
    pub description: String,
    pub organization_id: OrgId,
    pub status: ProposalStatus,
    pub priority: Priority,
    pub deadline: String,
    pub estimated_value: f64,
    pub created_by: UserId,
    pub tags: Vec<String>,
    pub current_version: i64,
    pub is_template: bool,
    pub created_at: String,
    pub updated_at: String,
}

/// A proposal with its related entities populated.
#[derive(Clone, Debug, Serialize)]
pub struct ProposalDetail {
    #[serde(flatten)]
    pub proposal: ProposalRow,
    pub organization: OrgRow,
    pub creator: UserRow,
    pub assigned_users: Vec<UserRow>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewProposal {
    pub title: String,
    pub description: String,
    pub organization_id: OrgId,
    pub priority: Priority,
    pub deadline: String,
    pub estimated_value: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub assigned_to: Vec<UserId>,
}

/// Partial update. Absent fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProposalPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<ProposalStatus>,
    pub priority: Option<Priority>,
    pub deadline: Option<String>,
    pub estimated_value: Option<f64>,
    pub tags: Option<Vec<String>>,
}

pub struct ProposalRepo {
    db: Database,
}

impl ProposalRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a proposal in draft, resolve assignees, and log the
    /// "created" activity — all in one transaction.
    #[instrument(skip(self, input), fields(title = %input.title, actor = %actor))]
    pub fn create(
        &self,
        input: &NewProposal,
        actor: &UserId,
    ) -> Result<ProposalDetail, StoreError> {
        let id = ProposalId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_tx(|tx| {
            organizations::fetch_org(tx, input.organization_id.as_str())?;
            for user_id in &input.assigned_to {
                users::fetch_user(tx, user_id.as_str())?;
            }

            tx.execute(
                "INSERT INTO proposals (id, title, description, organization_id, status, priority,
                                        deadline, estimated_value, created_by, tags, current_version,
                                        is_template, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, 1, 0, ?11, ?11)",
                rusqlite::params![
                    id.as_str(),
                    input.title,
                    input.description,
                    input.organization_id.as_str(),
                    ProposalStatus::Draft.to_string(),
                    input.priority.to_string(),
                    input.deadline,
                    input.estimated_value,
                    actor.as_str(),
                    tags::encode(&input.tags)?,
                    now,
                ],
            )?;

            for user_id in &input.assigned_to {
                tx.execute(
                    "INSERT OR IGNORE INTO proposal_assignments (proposal_id, user_id) VALUES (?1, ?2)",
                    rusqlite::params![id.as_str(), user_id.as_str()],
                )?;
            }

            activities::insert(
                tx,
                &id,
                actor,
                "created",
                &format!("Created proposal: {}", input.title),
            )?;

            fetch_detail(tx, id.as_str())
        })
    }

    #[instrument(skip(self), fields(proposal_id = %id))]
    pub fn get(&self, id: &ProposalId) -> Result<ProposalRow, StoreError> {
        self.db.with_conn(|conn| fetch_proposal(conn, id.as_str()))
    }

    /// Get a proposal with organization, creator, and assignees populated.
    #[instrument(skip(self), fields(proposal_id = %id))]
    pub fn get_detail(&self, id: &ProposalId) -> Result<ProposalDetail, StoreError> {
        self.db.with_conn(|conn| fetch_detail(conn, id.as_str()))
    }

    /// List proposals with optional status/organization filters.
    #[instrument(skip(self))]
    pub fn list(
        &self,
        status: Option<ProposalStatus>,
        organization_id: Option<&OrgId>,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<ProposalRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT id, title, description, organization_id, status, priority, deadline,
                        estimated_value, created_by, tags, current_version, is_template,
                        created_at, updated_at
                 FROM proposals WHERE 1=1",
            );
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(status) = status {
                sql.push_str(&format!(" AND status = ?{}", params.len() + 1));
                params.push(Box::new(status.to_string()));
            }
            if let Some(org_id) = organization_id {
                sql.push_str(&format!(" AND organization_id = ?{}", params.len() + 1));
                params.push(Box::new(org_id.as_str().to_string()));
            }

            sql.push_str(&format!(
                " ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
                params.len() + 1,
                params.len() + 2
            ));
            params.push(Box::new(limit));
            params.push(Box::new(offset));

            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            let mut stmt = conn.prepare(&sql)?;
            let mut rows = stmt.query(param_refs.as_slice())?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_proposal(row)?);
            }
            Ok(results)
        })
    }

    /// Apply a partial update. A status change also appends exactly one
    /// "status_updated" activity in the same transaction. Any status value
    /// is accepted; there is no transition graph.
    #[instrument(skip(self, patch), fields(proposal_id = %id, actor = %actor))]
    pub fn update(
        &self,
        id: &ProposalId,
        patch: &ProposalPatch,
        actor: &UserId,
    ) -> Result<ProposalDetail, StoreError> {
        let now = Utc::now().to_rfc3339();

        self.db.with_tx(|tx| {
            fetch_proposal(tx, id.as_str())?;

            let mut sets: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(title) = &patch.title {
                sets.push(format!("title = ?{}", params.len() + 1));
                params.push(Box::new(title.clone()));
            }
            if let Some(description) = &patch.description {
                sets.push(format!("description = ?{}", params.len() + 1));
                params.push(Box::new(description.clone()));
            }
            if let Some(status) = patch.status {
                sets.push(format!("status = ?{}", params.len() + 1));
                params.push(Box::new(status.to_string()));
            }
            if let Some(priority) = patch.priority {
                sets.push(format!("priority = ?{}", params.len() + 1));
                params.push(Box::new(priority.to_string()));
            }
            if let Some(deadline) = &patch.deadline {
                sets.push(format!("deadline = ?{}", params.len() + 1));
                params.push(Box::new(deadline.clone()));
            }
            if let Some(value) = patch.estimated_value {
                sets.push(format!("estimated_value = ?{}", params.len() + 1));
                params.push(Box::new(value));
            }
            if let Some(tag_list) = &patch.tags {
                sets.push(format!("tags = ?{}", params.len() + 1));
                params.push(Box::new(tags::encode(tag_list)?));
            }

            sets.push(format!("updated_at = ?{}", params.len() + 1));
            params.push(Box::new(now.clone()));

            params.push(Box::new(id.as_str().to_string()));
            let sql = format!(
                "UPDATE proposals SET {} WHERE id = ?{}",
                sets.join(", "),
                params.len()
            );
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            tx.execute(&sql, param_refs.as_slice())?;

            if let Some(status) = patch.status {
                activities::insert(
                    tx,
                    id,
                    actor,
                    "status_updated",
                    &format!("Status changed to: {status}"),
                )?;
            }

            fetch_detail(tx, id.as_str())
        })
    }
}

/// Cheap existence check used by repos that attach rows to a proposal.
pub(crate) fn ensure_proposal(conn: &Connection, id: &str) -> Result<(), StoreError> {
    let found: Option<i64> = conn
        .query_row("SELECT 1 FROM proposals WHERE id = ?1", [id], |row| {
            row.get(0)
        })
        .ok();
    match found {
        Some(_) => Ok(()),
        None => Err(StoreError::NotFound(format!("proposal {id}"))),
    }
}

pub(crate) fn fetch_proposal(conn: &Connection, id: &str) -> Result<ProposalRow, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, description, organization_id, status, priority, deadline,
                estimated_value, created_by, tags, current_version, is_template,
                created_at, updated_at
         FROM proposals WHERE id = ?1",
    )?;
    let mut rows = stmt.query([id])?;
    match rows.next()? {
        Some(row) => row_to_proposal(row),
        None => Err(StoreError::NotFound(format!("proposal {id}"))),
    }
}

fn fetch_detail(conn: &Connection, id: &str) -> Result<ProposalDetail, StoreError> {
    let proposal = fetch_proposal(conn, id)?;
    let organization = organizations::fetch_org(conn, proposal.organization_id.as_str())?;
    let creator = users::fetch_user(conn, proposal.created_by.as_str())?;

    let mut stmt = conn.prepare(
        "SELECT u.id, u.email, u.name, u.password_hash, u.is_active, u.created_at
         FROM proposal_assignments a
         JOIN users u ON u.id = a.user_id
         WHERE a.proposal_id = ?1
         ORDER BY u.id",
    )?;
    let mut rows = stmt.query([id])?;
    let mut assigned_users = Vec::new();
    while let Some(row) = rows.next()? {
        assigned_users.push(users::row_to_user(row)?);
    }

    Ok(ProposalDetail {
        proposal,
        organization,
        creator,
        assigned_users,
    })
}

fn row_to_proposal(row: &rusqlite::Row<'_>) -> Result<ProposalRow, StoreError> {
    let status_str: String = row_helpers::get(row, 4, "proposals", "status")?;
    let priority_str: String = row_helpers::get(row, 5, "proposals", "priority")?;
    let tags_raw: String = row_helpers::get(row, 9, "proposals", "tags")?;

    Ok(ProposalRow {
        id: ProposalId::from_raw(row_helpers::get::<String>(row, 0, "proposals", "id")?),
        title: row_helpers::get(row, 1, "proposals", "title")?,
        description: row_helpers::get(row, 2, "proposals", "description")?,
        organization_id: OrgId::from_raw(row_helpers::get::<String>(
            row,
            3,
            "proposals",
            "organization_id",
        )?),
        status: row_helpers::parse_enum(&status_str, "proposals", "status")?,
        priority: row_helpers::parse_enum(&priority_str, "proposals", "priority")?,
        deadline: row_helpers::get(row, 6, "proposals", "deadline")?,
        estimated_value: row_helpers::get(row, 7, "proposals", "estimated_value")?,
        created_by: UserId::from_raw(row_helpers::get::<String>(
            row,
            8,
            "proposals",
            "created_by",
        )?),
        tags: row_helpers::parse_string_list(&tags_raw, "proposals", "tags")?,
        current_version: row_helpers::get(row, 10, "proposals", "current_version")?,
        is_template: row_helpers::get::<bool>(row, 11, "proposals", "is_template")?,
        created_at: row_helpers::get(row, 12, "proposals", "created_at")?,
        updated_at: row_helpers::get(row, 13, "proposals", "updated_at")?,
    })
}
