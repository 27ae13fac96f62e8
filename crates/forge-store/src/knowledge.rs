use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use forge_core::ids::{KnowledgeId, UserId};
use forge_core::tags;
use forge_core::types::KnowledgeCategory;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;
use crate::users;

/// Search results are capped; there is no pagination beyond this.
pub const SEARCH_LIMIT: u32 = 20;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KnowledgeRow {
    pub id: KnowledgeId,
    pub title: String,
    pub content: String,
    pub category: KnowledgeCategory,
    pub tags: Vec<String>,
    pub industry: Option<String>,
    pub created_by: UserId,
    pub usage_count: i64,
    pub is_approved: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewKnowledgeItem {
    pub title: String,
    pub content: String,
    pub category: KnowledgeCategory,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub industry: Option<String>,
}

pub struct KnowledgeRepo {
    db: Database,
}

impl KnowledgeRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// New items always start unapproved, whatever the creator's role.
    #[instrument(skip(self, input), fields(title = %input.title, actor = %actor))]
    pub fn create(
        &self,
        input: &NewKnowledgeItem,
        actor: &UserId,
    ) -> Result<KnowledgeRow, StoreError> {
        let id = KnowledgeId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO knowledge_base (id, title, content, category, tags, industry,
                                             created_by, usage_count, is_approved, created_at,
                                             updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, 0, ?8, ?8)",
                rusqlite::params![
                    id.as_str(),
                    input.title,
                    input.content,
                    input.category.to_string(),
                    tags::encode(&input.tags)?,
                    input.industry,
                    actor.as_str(),
                    now,
                ],
            )?;

            Ok(KnowledgeRow {
                id: id.clone(),
                title: input.title.clone(),
                content: input.content.clone(),
                category: input.category,
                tags: input.tags.clone(),
                industry: input.industry.clone(),
                created_by: actor.clone(),
                usage_count: 0,
                is_approved: false,
                created_at: now.clone(),
                updated_at: now.clone(),
            })
        })
    }

    #[instrument(skip(self), fields(knowledge_id = %id))]
    pub fn get(&self, id: &KnowledgeId) -> Result<KnowledgeRow, StoreError> {
        self.db.with_conn(|conn| fetch_item(conn, id.as_str()))
    }

    /// List items with optional filters. `approved_only` defaults to true
    /// at the boundary; pass false to see drafts awaiting approval.
    #[instrument(skip(self))]
    pub fn list(
        &self,
        category: Option<KnowledgeCategory>,
        industry: Option<&str>,
        approved_only: bool,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<KnowledgeRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut sql = String::from(
                "SELECT id, title, content, category, tags, industry, created_by, usage_count,
                        is_approved, created_at, updated_at
                 FROM knowledge_base WHERE 1=1",
            );
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if approved_only {
                sql.push_str(" AND is_approved = 1");
            }
            if let Some(category) = category {
                sql.push_str(&format!(" AND category = ?{}", params.len() + 1));
                params.push(Box::new(category.to_string()));
            }
            if let Some(industry) = industry {
                sql.push_str(&format!(" AND industry = ?{}", params.len() + 1));
                params.push(Box::new(industry.to_string()));
            }

            sql.push_str(&format!(
                " ORDER BY created_at DESC, id DESC LIMIT ?{} OFFSET ?{}",
                params.len() + 1,
                params.len() + 2
            ));
            params.push(Box::new(limit));
            params.push(Box::new(offset));

            run_query(conn, &sql, &params)
        })
    }

    /// Case-insensitive substring search over title OR content, approved
    /// items only, capped at SEARCH_LIMIT.
    #[instrument(skip(self), fields(query))]
    pub fn search(
        &self,
        query: &str,
        category: Option<KnowledgeCategory>,
        industry: Option<&str>,
    ) -> Result<Vec<KnowledgeRow>, StoreError> {
        self.db.with_conn(|conn| {
            let pattern = format!("%{}%", row_helpers::escape_like(query));

            let mut sql = String::from(
                "SELECT id, title, content, category, tags, industry, created_by, usage_count,
                        is_approved, created_at, updated_at
                 FROM knowledge_base
                 WHERE is_approved = 1
                   AND (title LIKE ?1 ESCAPE '\\' OR content LIKE ?1 ESCAPE '\\')",
            );
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = vec![Box::new(pattern)];

            if let Some(category) = category {
                sql.push_str(&format!(" AND category = ?{}", params.len() + 1));
                params.push(Box::new(category.to_string()));
            }
            if let Some(industry) = industry {
                sql.push_str(&format!(" AND industry = ?{}", params.len() + 1));
                params.push(Box::new(industry.to_string()));
            }

            sql.push_str(&format!(
                " ORDER BY created_at DESC, id DESC LIMIT ?{}",
                params.len() + 1
            ));
            params.push(Box::new(SEARCH_LIMIT));

            run_query(conn, &sql, &params)
        })
    }

    /// Approve an item. Requires the actor's profile to carry the
    /// "approve" permission token. One-way: there is no unapprove, and
    /// re-approving is a no-op.
    #[instrument(skip(self), fields(knowledge_id = %id, actor = %actor))]
    pub fn approve(&self, id: &KnowledgeId, actor: &UserId) -> Result<KnowledgeRow, StoreError> {
        let now = Utc::now().to_rfc3339();

        self.db.with_tx(|tx| {
            let profile = users::fetch_profile(tx, actor.as_str())?
                .ok_or_else(|| StoreError::NotFound(format!("profile for user {actor}")))?;
            if !profile.permissions.iter().any(|p| p == "approve") {
                return Err(StoreError::PermissionDenied(format!(
                    "user {actor} lacks the approve permission"
                )));
            }

            fetch_item(tx, id.as_str())?;

            tx.execute(
                "UPDATE knowledge_base SET is_approved = 1, updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, id.as_str()],
            )?;

            fetch_item(tx, id.as_str())
        })
    }

    /// Bump the usage counter. No cap, no authorization check.
    #[instrument(skip(self), fields(knowledge_id = %id))]
    pub fn increment_usage(&self, id: &KnowledgeId) -> Result<i64, StoreError> {
        self.db.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE knowledge_base SET usage_count = usage_count + 1 WHERE id = ?1",
                [id.as_str()],
            )?;
            if updated == 0 {
                return Err(StoreError::NotFound(format!("knowledge item {id}")));
            }
            conn.query_row(
                "SELECT usage_count FROM knowledge_base WHERE id = ?1",
                [id.as_str()],
                |row| row.get(0),
            )
            .map_err(StoreError::from)
        })
    }
}

fn run_query(
    conn: &rusqlite::Connection,
    sql: &str,
    params: &[Box<dyn rusqlite::types::ToSql>],
) -> Result<Vec<KnowledgeRow>, StoreError> {
    let param_refs: Vec<&dyn rusqlite::types::ToSql> = params.iter().map(|p| p.as_ref()).collect();
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(param_refs.as_slice())?;
    let mut results = Vec::new();
    while let Some(row) = rows.next()? {
        results.push(row_to_item(row)?);
    }
    Ok(results)
}

fn fetch_item(conn: &rusqlite::Connection, id: &str) -> Result<KnowledgeRow, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, title, content, category, tags, industry, created_by, usage_count,
                is_approved, created_at, updated_at
         FROM knowledge_base WHERE id = ?1",
    )?;
    let mut rows = stmt.query([id])?;
    match rows.next()? {
        Some(row) => row_to_item(row),
        None => Err(StoreError::NotFound(format!("knowledge item {id}"))),
    }
}

fn row_to_item(row: &rusqlite::Row<'_>) -> Result<KnowledgeRow, StoreError> {
    let category_str: String = row_helpers::get(row, 3, "knowledge_base", "category")?;
    let tags_raw: String = row_helpers::get(row, 4, "knowledge_base", "tags")?;

    Ok(KnowledgeRow {
        id: KnowledgeId::from_raw(row_helpers::get::<String>(row, 0, "knowledge_base", "id")?),
        title: row_helpers::get(row, 1, "knowledge_base", "title")?,
        content: row_helpers::get(row, 2, "knowledge_base", "content")?,
        category: row_helpers::parse_enum(&category_str, "knowledge_base", "category")?,
        tags: row_helpers::parse_string_list(&tags_raw, "knowledge_base", "tags")?,
        industry: row_helpers::get_opt(row, 5, "knowledge_base", "industry")?,
        created_by: UserId::from_raw(row_helpers::get::<String>(
            row,
            6,
            "knowledge_base",
            "created_by",
        )?),
        usage_count: row_helpers::get(row, 7, "knowledge_base", "usage_count")?,
        is_approved: row_helpers::get::<bool>(row, 8, "knowledge_base", "is_approved")?,
        created_at: row_helpers::get(row, 9, "knowledge_base", "created_at")?,
        updated_at: row_helpers::get(row, 10, "knowledge_base", "updated_at")?,
    })
}
