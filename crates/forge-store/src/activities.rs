//! Append-only audit log of state-changing proposal actions.
//! Rows are inserted inside the same transaction as the change they record
//! and are never updated or deleted.

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use forge_core::ids::{ActivityId, ProposalId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActivityRow {
    pub id: ActivityId,
    pub proposal_id: ProposalId,
    pub user_id: UserId,
    pub action: String,
    pub details: String,
    pub timestamp: String,
}

/// Insert one activity row on the caller's connection, so lifecycle
/// operations can append atomically with the entity write.
pub(crate) fn insert(
    conn: &Connection,
    proposal_id: &ProposalId,
    user_id: &UserId,
    action: &str,
    details: &str,
) -> Result<ActivityRow, StoreError> {
    let id = ActivityId::new();
    let now = Utc::now().to_rfc3339();

    conn.execute(
        "INSERT INTO activities (id, proposal_id, user_id, action, details, timestamp)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            id.as_str(),
            proposal_id.as_str(),
            user_id.as_str(),
            action,
            details,
            now,
        ],
    )?;

    Ok(ActivityRow {
        id,
        proposal_id: proposal_id.clone(),
        user_id: user_id.clone(),
        action: action.to_string(),
        details: details.to_string(),
        timestamp: now,
    })
}

pub struct ActivityRepo {
    db: Database,
}

impl ActivityRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// List a proposal's activities, most recent first.
    #[instrument(skip(self), fields(proposal_id = %proposal_id))]
    pub fn list_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<ActivityRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, proposal_id, user_id, action, details, timestamp
                 FROM activities WHERE proposal_id = ?1
                 ORDER BY timestamp DESC, id DESC",
            )?;
            let mut rows = stmt.query([proposal_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_activity(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_activity(row: &rusqlite::Row<'_>) -> Result<ActivityRow, StoreError> {
    Ok(ActivityRow {
        id: ActivityId::from_raw(row_helpers::get::<String>(row, 0, "activities", "id")?),
        proposal_id: ProposalId::from_raw(row_helpers::get::<String>(
            row,
            1,
            "activities",
            "proposal_id",
        )?),
        user_id: UserId::from_raw(row_helpers::get::<String>(row, 2, "activities", "user_id")?),
        action: row_helpers::get(row, 3, "activities", "action")?,
        details: row_helpers::get(row, 4, "activities", "details")?,
        timestamp: row_helpers::get(row, 5, "activities", "timestamp")?,
    })
}
