//! Threaded comments on proposals and sections. Threads are flat rows with
//! an optional parent id (arena style); callers rebuild the tree by index
//! lookup. A parent must already exist on the same proposal, which rules
//! out cycles and self-parenting at creation time.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use forge_core::ids::{CommentId, ProposalId, SectionId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::proposals;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CommentRow {
    pub id: CommentId,
    pub proposal_id: ProposalId,
    pub section_id: Option<SectionId>,
    pub content: String,
    pub author_id: UserId,
    pub parent_comment_id: Option<CommentId>,
    pub is_resolved: bool,
    pub created_at: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewComment {
    pub content: String,
    #[serde(default)]
    pub section_id: Option<SectionId>,
    #[serde(default)]
    pub parent_comment_id: Option<CommentId>,
}

pub struct CommentRepo {
    db: Database,
}

impl CommentRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(proposal_id = %proposal_id, actor = %actor))]
    pub fn create(
        &self,
        proposal_id: &ProposalId,
        input: &NewComment,
        actor: &UserId,
    ) -> Result<CommentRow, StoreError> {
        let id = CommentId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_tx(|tx| {
            proposals::ensure_proposal(tx, proposal_id.as_str())?;

            if let Some(section_id) = &input.section_id {
                let found: Option<i64> = tx
                    .query_row(
                        "SELECT 1 FROM proposal_sections WHERE id = ?1 AND proposal_id = ?2",
                        [section_id.as_str(), proposal_id.as_str()],
                        |row| row.get(0),
                    )
                    .ok();
                if found.is_none() {
                    return Err(StoreError::NotFound(format!("section {section_id}")));
                }
            }

            if let Some(parent_id) = &input.parent_comment_id {
                let parent_proposal: Option<String> = tx
                    .query_row(
                        "SELECT proposal_id FROM comments WHERE id = ?1",
                        [parent_id.as_str()],
                        |row| row.get(0),
                    )
                    .ok();
                match parent_proposal {
                    Some(p) if p == proposal_id.as_str() => {}
                    _ => {
                        return Err(StoreError::NotFound(format!("parent comment {parent_id}")));
                    }
                }
            }

            tx.execute(
                "INSERT INTO comments (id, proposal_id, section_id, content, author_id,
                                       parent_comment_id, is_resolved, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, ?7)",
                rusqlite::params![
                    id.as_str(),
                    proposal_id.as_str(),
                    input.section_id.as_ref().map(|s| s.as_str().to_string()),
                    input.content,
                    actor.as_str(),
                    input
                        .parent_comment_id
                        .as_ref()
                        .map(|c| c.as_str().to_string()),
                    now,
                ],
            )?;

            Ok(CommentRow {
                id: id.clone(),
                proposal_id: proposal_id.clone(),
                section_id: input.section_id.clone(),
                content: input.content.clone(),
                author_id: actor.clone(),
                parent_comment_id: input.parent_comment_id.clone(),
                is_resolved: false,
                created_at: now.clone(),
            })
        })
    }

    /// List a proposal's comments oldest first, optionally scoped to one
    /// section.
    #[instrument(skip(self), fields(proposal_id = %proposal_id))]
    pub fn list(
        &self,
        proposal_id: &ProposalId,
        section_id: Option<&SectionId>,
    ) -> Result<Vec<CommentRow>, StoreError> {
        self.db.with_conn(|conn| {
            let (sql, params): (&str, Vec<String>) = match section_id {
                Some(section) => (
                    "SELECT id, proposal_id, section_id, content, author_id, parent_comment_id,
                            is_resolved, created_at
                     FROM comments WHERE proposal_id = ?1 AND section_id = ?2
                     ORDER BY created_at ASC, id ASC",
                    vec![
                        proposal_id.as_str().to_string(),
                        section.as_str().to_string(),
                    ],
                ),
                None => (
                    "SELECT id, proposal_id, section_id, content, author_id, parent_comment_id,
                            is_resolved, created_at
                     FROM comments WHERE proposal_id = ?1
                     ORDER BY created_at ASC, id ASC",
                    vec![proposal_id.as_str().to_string()],
                ),
            };

            let mut stmt = conn.prepare(sql)?;
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p as &dyn rusqlite::types::ToSql).collect();
            let mut rows = stmt.query(param_refs.as_slice())?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_comment(row)?);
            }
            Ok(results)
        })
    }

    /// Toggle resolution.
    #[instrument(skip(self), fields(comment_id = %id, resolved))]
    pub fn resolve(&self, id: &CommentId, resolved: bool) -> Result<CommentRow, StoreError> {
        self.db.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE comments SET is_resolved = ?1 WHERE id = ?2",
                rusqlite::params![resolved, id.as_str()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("comment {id}")));
            }

            let mut stmt = conn.prepare(
                "SELECT id, proposal_id, section_id, content, author_id, parent_comment_id,
                        is_resolved, created_at
                 FROM comments WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id.as_str()])?;
            match rows.next()? {
                Some(row) => row_to_comment(row),
                None => Err(StoreError::NotFound(format!("comment {id}"))),
            }
        })
    }
}

fn row_to_comment(row: &rusqlite::Row<'_>) -> Result<CommentRow, StoreError> {
    Ok(CommentRow {
        id: CommentId::from_raw(row_helpers::get::<String>(row, 0, "comments", "id")?),
        proposal_id: ProposalId::from_raw(row_helpers::get::<String>(
            row,
            1,
            "comments",
            "proposal_id",
        )?),
        section_id: row_helpers::get_opt::<String>(row, 2, "comments", "section_id")?
            .map(SectionId::from_raw),
        content: row_helpers::get(row, 3, "comments", "content")?,
        author_id: UserId::from_raw(row_helpers::get::<String>(row, 4, "comments", "author_id")?),
        parent_comment_id: row_helpers::get_opt::<String>(
            row,
            5,
            "comments",
            "parent_comment_id",
        )?
        .map(CommentId::from_raw),
        is_resolved: row_helpers::get::<bool>(row, 6, "comments", "is_resolved")?,
        created_at: row_helpers::get(row, 7, "comments", "created_at")?,
    })
}
