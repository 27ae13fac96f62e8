//! Attachment metadata. The bytes themselves live wherever storage_path
//! points; this store never touches file contents.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use forge_core::ids::{AttachmentId, ProposalId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::proposals;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachmentRow {
    pub id: AttachmentId,
    pub proposal_id: ProposalId,
    pub file_name: String,
    pub file_type: String,
    pub storage_path: String,
    pub uploaded_by: UserId,
    pub size_bytes: i64,
    pub created_at: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewAttachment {
    pub file_name: String,
    pub file_type: String,
    pub storage_path: String,
    pub size_bytes: i64,
}

pub struct AttachmentRepo {
    db: Database,
}

impl AttachmentRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(proposal_id = %proposal_id, file_name = %input.file_name, actor = %actor))]
    pub fn add(
        &self,
        proposal_id: &ProposalId,
        input: &NewAttachment,
        actor: &UserId,
    ) -> Result<AttachmentRow, StoreError> {
        let id = AttachmentId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_tx(|tx| {
            proposals::ensure_proposal(tx, proposal_id.as_str())?;

            tx.execute(
                "INSERT INTO attachments (id, proposal_id, file_name, file_type, storage_path,
                                          uploaded_by, size_bytes, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id.as_str(),
                    proposal_id.as_str(),
                    input.file_name,
                    input.file_type,
                    input.storage_path,
                    actor.as_str(),
                    input.size_bytes,
                    now,
                ],
            )?;

            Ok(AttachmentRow {
                id: id.clone(),
                proposal_id: proposal_id.clone(),
                file_name: input.file_name.clone(),
                file_type: input.file_type.clone(),
                storage_path: input.storage_path.clone(),
                uploaded_by: actor.clone(),
                size_bytes: input.size_bytes,
                created_at: now.clone(),
            })
        })
    }

    /// List a proposal's attachments in upload order.
    #[instrument(skip(self), fields(proposal_id = %proposal_id))]
    pub fn list_for_proposal(
        &self,
        proposal_id: &ProposalId,
    ) -> Result<Vec<AttachmentRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, proposal_id, file_name, file_type, storage_path, uploaded_by,
                        size_bytes, created_at
                 FROM attachments WHERE proposal_id = ?1
                 ORDER BY created_at ASC, id ASC",
            )?;
            let mut rows = stmt.query([proposal_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_attachment(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_attachment(row: &rusqlite::Row<'_>) -> Result<AttachmentRow, StoreError> {
    Ok(AttachmentRow {
        id: AttachmentId::from_raw(row_helpers::get::<String>(row, 0, "attachments", "id")?),
        proposal_id: ProposalId::from_raw(row_helpers::get::<String>(
            row,
            1,
            "attachments",
            "proposal_id",
        )?),
        file_name: row_helpers::get(row, 2, "attachments", "file_name")?,
        file_type: row_helpers::get(row, 3, "attachments", "file_type")?,
        storage_path: row_helpers::get(row, 4, "attachments", "storage_path")?,
        uploaded_by: UserId::from_raw(row_helpers::get::<String>(
            row,
            5,
            "attachments",
            "uploaded_by",
        )?),
        size_bytes: row_helpers::get(row, 6, "attachments", "size_bytes")?,
        created_at: row_helpers::get(row, 7, "attachments", "created_at")?,
    })
}
