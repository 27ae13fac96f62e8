use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use forge_core::ids::{ApprovalId, ProposalId, UserId};
use forge_core::types::ApprovalStatus;

use crate::database::Database;
use crate::error::StoreError;
use crate::proposals;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApprovalRow {
    pub id: ApprovalId,
    pub proposal_id: ProposalId,
    pub requested_by: UserId,
    pub approver_role: String,
    pub status: ApprovalStatus,
    pub comments: Option<String>,
    pub requested_at: String,
    pub responded_at: Option<String>,
}

pub struct ApprovalRepo {
    db: Database,
}

impl ApprovalRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open a pending approval request against a proposal.
    #[instrument(skip(self), fields(proposal_id = %proposal_id, approver_role, actor = %actor))]
    pub fn request(
        &self,
        proposal_id: &ProposalId,
        approver_role: &str,
        actor: &UserId,
    ) -> Result<ApprovalRow, StoreError> {
        let id = ApprovalId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_tx(|tx| {
            proposals::ensure_proposal(tx, proposal_id.as_str())?;

            tx.execute(
                "INSERT INTO approvals (id, proposal_id, requested_by, approver_role, status,
                                        comments, requested_at, responded_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, NULL, ?6, NULL)",
                rusqlite::params![
                    id.as_str(),
                    proposal_id.as_str(),
                    actor.as_str(),
                    approver_role,
                    ApprovalStatus::Pending.to_string(),
                    now,
                ],
            )?;

            Ok(ApprovalRow {
                id: id.clone(),
                proposal_id: proposal_id.clone(),
                requested_by: actor.clone(),
                approver_role: approver_role.to_string(),
                status: ApprovalStatus::Pending,
                comments: None,
                requested_at: now.clone(),
                responded_at: None,
            })
        })
    }

    /// Resolve a pending approval. Responding twice is a conflict.
    #[instrument(skip(self, comments), fields(approval_id = %id, approved))]
    pub fn respond(
        &self,
        id: &ApprovalId,
        approved: bool,
        comments: Option<&str>,
    ) -> Result<ApprovalRow, StoreError> {
        let now = Utc::now().to_rfc3339();
        let status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };

        self.db.with_tx(|tx| {
            let current = fetch_approval(tx, id.as_str())?;
            if current.status != ApprovalStatus::Pending {
                return Err(StoreError::Conflict(format!(
                    "approval {id} already resolved"
                )));
            }

            tx.execute(
                "UPDATE approvals SET status = ?1, comments = ?2, responded_at = ?3 WHERE id = ?4",
                rusqlite::params![status.to_string(), comments, now, id.as_str()],
            )?;

            fetch_approval(tx, id.as_str())
        })
    }

    /// List a proposal's approvals, newest request first.
    #[instrument(skip(self), fields(proposal_id = %proposal_id))]
    pub fn list_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<ApprovalRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, proposal_id, requested_by, approver_role, status, comments,
                        requested_at, responded_at
                 FROM approvals WHERE proposal_id = ?1
                 ORDER BY requested_at DESC, id DESC",
            )?;
            let mut rows = stmt.query([proposal_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_approval(row)?);
            }
            Ok(results)
        })
    }
}

fn fetch_approval(conn: &rusqlite::Connection, id: &str) -> Result<ApprovalRow, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, proposal_id, requested_by, approver_role, status, comments,
                requested_at, responded_at
         FROM approvals WHERE id = ?1",
    )?;
    let mut rows = stmt.query([id])?;
    match rows.next()? {
        Some(row) => row_to_approval(row),
        None => Err(StoreError::NotFound(format!("approval {id}"))),
    }
}

fn row_to_approval(row: &rusqlite::Row<'_>) -> Result<ApprovalRow, StoreError> {
    let status_str: String = row_helpers::get(row, 4, "approvals", "status")?;

    Ok(ApprovalRow {
        id: ApprovalId::from_raw(row_helpers::get::<String>(row, 0, "approvals", "id")?),
        proposal_id: ProposalId::from_raw(row_helpers::get::<String>(
            row,
            1,
            "approvals",
            "proposal_id",
        )?),
        requested_by: UserId::from_raw(row_helpers::get::<String>(
            row,
            2,
            "approvals",
            "requested_by",
        )?),
        approver_role: row_helpers::get(row, 3, "approvals", "approver_role")?,
        status: row_helpers::parse_enum(&status_str, "approvals", "status")?,
        comments: row_helpers::get_opt(row, 5, "approvals", "comments")?,
        requested_at: row_helpers::get(row, 6, "approvals", "requested_at")?,
        responded_at: row_helpers::get_opt(row, 7, "approvals", "responded_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::organizations::{NewOrganization, OrgRepo};
    use crate::proposals::{NewProposal, ProposalRepo};
    use crate::users::UserRepo;
    use forge_core::types::Priority;

    fn setup() -> (Database, UserId, ProposalId) {
        let db = Database::in_memory().unwrap();
        let user = UserRepo::new(db.clone())
            .create("amina@acme.com", "Amina", "hash")
            .unwrap();
        let org = OrgRepo::new(db.clone())
            .create(
                &NewOrganization {
                    name: "Acme".into(),
                    industry: "software".into(),
                    size: "200-500".into(),
                    description: None,
                },
                &user.id,
            )
            .unwrap();
        let proposal = ProposalRepo::new(db.clone())
            .create(
                &NewProposal {
                    title: "Q1 Deal".into(),
                    description: "desc".into(),
                    organization_id: org.id,
                    priority: Priority::Medium,
                    deadline: "2026-12-31T00:00:00Z".into(),
                    estimated_value: 1000.0,
                    tags: vec![],
                    assigned_to: vec![],
                },
                &user.id,
            )
            .unwrap();
        (db, user.id, proposal.proposal.id)
    }

    #[test]
    fn request_starts_pending() {
        let (db, actor, proposal_id) = setup();
        let repo = ApprovalRepo::new(db);
        let approval = repo.request(&proposal_id, "manager", &actor).unwrap();
        assert_eq!(approval.status, ApprovalStatus::Pending);
        assert!(approval.responded_at.is_none());
    }

    #[test]
    fn request_unknown_proposal_fails() {
        let (db, actor, _) = setup();
        let repo = ApprovalRepo::new(db);
        let result = repo.request(&ProposalId::from_raw("prop_nonexistent"), "manager", &actor);
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn respond_sets_status_and_timestamp() {
        let (db, actor, proposal_id) = setup();
        let repo = ApprovalRepo::new(db);
        let approval = repo.request(&proposal_id, "manager", &actor).unwrap();

        let resolved = repo
            .respond(&approval.id, false, Some("pricing needs work"))
            .unwrap();
        assert_eq!(resolved.status, ApprovalStatus::Rejected);
        assert_eq!(resolved.comments.as_deref(), Some("pricing needs work"));
        assert!(resolved.responded_at.is_some());
    }

    #[test]
    fn responding_twice_conflicts() {
        let (db, actor, proposal_id) = setup();
        let repo = ApprovalRepo::new(db);
        let approval = repo.request(&proposal_id, "manager", &actor).unwrap();
        repo.respond(&approval.id, true, None).unwrap();

        let again = repo.respond(&approval.id, false, None);
        assert!(matches!(again, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn list_for_proposal() {
        let (db, actor, proposal_id) = setup();
        let repo = ApprovalRepo::new(db);
        repo.request(&proposal_id, "manager", &actor).unwrap();
        repo.request(&proposal_id, "admin", &actor).unwrap();

        let approvals = repo.list_for_proposal(&proposal_id).unwrap();
        assert_eq!(approvals.len(), 2);
        assert_eq!(approvals[0].approver_role, "admin");
    }
}
