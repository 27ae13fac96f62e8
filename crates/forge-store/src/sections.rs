use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use forge_core::ids::{ProposalId, SectionId, UserId};
use forge_core::types::SectionType;

use crate::activities;
use crate::database::Database;
use crate::error::StoreError;
use crate::proposals;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SectionRow {
    pub id: SectionId,
    pub proposal_id: ProposalId,
    pub title: String,
    pub content: String,
    pub section_type: SectionType,
    pub order: i64,
    pub last_edited_by: UserId,
    pub version: i64,
    pub is_locked: bool,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewSection {
    pub title: String,
    pub content: String,
    pub section_type: SectionType,
    pub order: i64,
}

/// Partial update. Absent fields are left untouched.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SectionPatch {
    pub title: Option<String>,
    pub content: Option<String>,
    pub section_type: Option<SectionType>,
    pub order: Option<i64>,
    pub is_locked: Option<bool>,
}

pub struct SectionRepo {
    db: Database,
}

impl SectionRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a section at version 1 and log the "section_created"
    /// activity in the same transaction.
    #[instrument(skip(self, input), fields(proposal_id = %proposal_id, title = %input.title, actor = %actor))]
    pub fn create(
        &self,
        proposal_id: &ProposalId,
        input: &NewSection,
        actor: &UserId,
    ) -> Result<SectionRow, StoreError> {
        let id = SectionId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_tx(|tx| {
            proposals::ensure_proposal(tx, proposal_id.as_str())?;

            tx.execute(
                "INSERT INTO proposal_sections (id, proposal_id, title, content, section_type,
                                                sort_order, last_edited_by, version, is_locked,
                                                created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, 0, ?8, ?8)",
                rusqlite::params![
                    id.as_str(),
                    proposal_id.as_str(),
                    input.title,
                    input.content,
                    input.section_type.to_string(),
                    input.order,
                    actor.as_str(),
                    now,
                ],
            )?;

            activities::insert(
                tx,
                proposal_id,
                actor,
                "section_created",
                &format!("Created section: {}", input.title),
            )?;

            Ok(SectionRow {
                id: id.clone(),
                proposal_id: proposal_id.clone(),
                title: input.title.clone(),
                content: input.content.clone(),
                section_type: input.section_type,
                order: input.order,
                last_edited_by: actor.clone(),
                version: 1,
                is_locked: false,
                created_at: now.clone(),
                updated_at: now.clone(),
            })
        })
    }

    /// Apply a partial update. Every accepted update records the actor as
    /// last editor and bumps the version by exactly 1, even when only
    /// non-content fields (e.g. order) change. Section updates log no
    /// activity. A locked section rejects everything except an unlock.
    #[instrument(skip(self, patch), fields(proposal_id = %proposal_id, section_id = %section_id, actor = %actor))]
    pub fn update(
        &self,
        proposal_id: &ProposalId,
        section_id: &SectionId,
        patch: &SectionPatch,
        actor: &UserId,
    ) -> Result<SectionRow, StoreError> {
        let now = Utc::now().to_rfc3339();

        self.db.with_tx(|tx| {
            let current = fetch_section(tx, proposal_id.as_str(), section_id.as_str())?;

            if current.is_locked && patch.is_locked != Some(false) {
                return Err(StoreError::Conflict(format!(
                    "section {section_id} is locked"
                )));
            }

            let mut sets: Vec<String> = Vec::new();
            let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

            if let Some(title) = &patch.title {
                sets.push(format!("title = ?{}", params.len() + 1));
                params.push(Box::new(title.clone()));
            }
            if let Some(content) = &patch.content {
                sets.push(format!("content = ?{}", params.len() + 1));
                params.push(Box::new(content.clone()));
            }
            if let Some(section_type) = patch.section_type {
                sets.push(format!("section_type = ?{}", params.len() + 1));
                params.push(Box::new(section_type.to_string()));
            }
            if let Some(order) = patch.order {
                sets.push(format!("sort_order = ?{}", params.len() + 1));
                params.push(Box::new(order));
            }
            if let Some(is_locked) = patch.is_locked {
                sets.push(format!("is_locked = ?{}", params.len() + 1));
                params.push(Box::new(is_locked));
            }

            sets.push(format!("last_edited_by = ?{}", params.len() + 1));
            params.push(Box::new(actor.as_str().to_string()));
            sets.push("version = version + 1".to_string());
            sets.push(format!("updated_at = ?{}", params.len() + 1));
            params.push(Box::new(now.clone()));

            params.push(Box::new(section_id.as_str().to_string()));
            let sql = format!(
                "UPDATE proposal_sections SET {} WHERE id = ?{}",
                sets.join(", "),
                params.len()
            );
            let param_refs: Vec<&dyn rusqlite::types::ToSql> =
                params.iter().map(|p| p.as_ref()).collect();
            tx.execute(&sql, param_refs.as_slice())?;

            fetch_section(tx, proposal_id.as_str(), section_id.as_str())
        })
    }

    /// List a proposal's sections in render order; insertion order breaks
    /// ties (ids are time-ordered).
    #[instrument(skip(self), fields(proposal_id = %proposal_id))]
    pub fn list(&self, proposal_id: &ProposalId) -> Result<Vec<SectionRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, proposal_id, title, content, section_type, sort_order,
                        last_edited_by, version, is_locked, created_at, updated_at
                 FROM proposal_sections WHERE proposal_id = ?1
                 ORDER BY sort_order ASC, id ASC",
            )?;
            let mut rows = stmt.query([proposal_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_section(row)?);
            }
            Ok(results)
        })
    }
}

fn fetch_section(
    conn: &rusqlite::Connection,
    proposal_id: &str,
    section_id: &str,
) -> Result<SectionRow, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, proposal_id, title, content, section_type, sort_order,
                last_edited_by, version, is_locked, created_at, updated_at
         FROM proposal_sections WHERE id = ?1 AND proposal_id = ?2",
    )?;
    let mut rows = stmt.query([section_id, proposal_id])?;
    match rows.next()? {
        Some(row) => row_to_section(row),
        None => Err(StoreError::NotFound(format!("section {section_id}"))),
    }
}

fn row_to_section(row: &rusqlite::Row<'_>) -> Result<SectionRow, StoreError> {
    let type_str: String = row_helpers::get(row, 4, "proposal_sections", "section_type")?;

    Ok(SectionRow {
        id: SectionId::from_raw(row_helpers::get::<String>(row, 0, "proposal_sections", "id")?),
        proposal_id: ProposalId::from_raw(row_helpers::get::<String>(
            row,
            1,
            "proposal_sections",
            "proposal_id",
        )?),
        title: row_helpers::get(row, 2, "proposal_sections", "title")?,
        content: row_helpers::get(row, 3, "proposal_sections", "content")?,
        section_type: row_helpers::parse_enum(&type_str, "proposal_sections", "section_type")?,
        order: row_helpers::get(row, 5, "proposal_sections", "sort_order")?,
        last_edited_by: UserId::from_raw(row_helpers::get::<String>(
            row,
            6,
            "proposal_sections",
            "last_edited_by",
        )?),
        version: row_helpers::get(row, 7, "proposal_sections", "version")?,
        is_locked: row_helpers::get::<bool>(row, 8, "proposal_sections", "is_locked")?,
        created_at: row_helpers::get(row, 9, "proposal_sections", "created_at")?,
        updated_at: row_helpers::get(row, 10, "proposal_sections", "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activities::ActivityRepo;
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
                    priority: Priority::High,
                    deadline: "2026-12-31T00:00:00Z".into(),
                    estimated_value: 50_000.0,
                    tags: vec![],
                    assigned_to: vec![],
                },
                &user.id,
            )
            .unwrap();
        (db, user.id, proposal.proposal.id)
    }

    fn section_input(title: &str, order: i64) -> NewSection {
        NewSection {
            title: title.to_string(),
            content: "...".to_string(),
            section_type: SectionType::Pricing,
            order,
        }
    }

    #[test]
    fn create_starts_at_version_one() {
        let (db, actor, proposal_id) = setup();
        let repo = SectionRepo::new(db.clone());
        let section = repo
            .create(&proposal_id, &section_input("Pricing", 1), &actor)
            .unwrap();
        assert_eq!(section.version, 1);
        assert_eq!(section.last_edited_by, actor);
        assert!(!section.is_locked);

        let activities = ActivityRepo::new(db).list_for_proposal(&proposal_id).unwrap();
        assert_eq!(activities[0].action, "section_created");
        assert!(activities[0].details.contains("Pricing"));
    }

    #[test]
    fn create_unknown_proposal_fails() {
        let (db, actor, _) = setup();
        let repo = SectionRepo::new(db);
        let result = repo.create(
            &ProposalId::from_raw("prop_nonexistent"),
            &section_input("Pricing", 1),
            &actor,
        );
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn every_update_bumps_version_by_one() {
        let (db, actor, proposal_id) = setup();
        let repo = SectionRepo::new(db);
        let section = repo
            .create(&proposal_id, &section_input("Pricing", 1), &actor)
            .unwrap();

        // Mixed content and non-content updates: +1 each, no exceptions
        let patches = [
            SectionPatch {
                content: Some("new content".into()),
                ..Default::default()
            },
            SectionPatch {
                order: Some(7),
                ..Default::default()
            },
            SectionPatch::default(),
        ];
        let mut expected = 1;
        for patch in &patches {
            let updated = repo
                .update(&proposal_id, &section.id, patch, &actor)
                .unwrap();
            expected += 1;
            assert_eq!(updated.version, expected);
        }
    }

    #[test]
    fn update_records_last_editor() {
        let (db, actor, proposal_id) = setup();
        let editor = UserRepo::new(db.clone())
            .create("bo@acme.com", "Bo", "hash")
            .unwrap();
        let repo = SectionRepo::new(db);
        let section = repo
            .create(&proposal_id, &section_input("Pricing", 1), &actor)
            .unwrap();

        let updated = repo
            .update(
                &proposal_id,
                &section.id,
                &SectionPatch {
                    content: Some("edited".into()),
                    ..Default::default()
                },
                &editor.id,
            )
            .unwrap();
        assert_eq!(updated.last_edited_by, editor.id);
    }

    #[test]
    fn update_logs_no_activity() {
        let (db, actor, proposal_id) = setup();
        let repo = SectionRepo::new(db.clone());
        let section = repo
            .create(&proposal_id, &section_input("Pricing", 1), &actor)
            .unwrap();
        repo.update(
            &proposal_id,
            &section.id,
            &SectionPatch {
                content: Some("edited".into()),
                ..Default::default()
            },
            &actor,
        )
        .unwrap();

        // "created" + "section_created" only; updates stay silent
        let activities = ActivityRepo::new(db).list_for_proposal(&proposal_id).unwrap();
        assert_eq!(activities.len(), 2);
    }

    #[test]
    fn update_requires_matching_proposal() {
        let (db, actor, proposal_id) = setup();
        let repo = SectionRepo::new(db.clone());
        let section = repo
            .create(&proposal_id, &section_input("Pricing", 1), &actor)
            .unwrap();

        let result = repo.update(
            &ProposalId::from_raw("prop_other"),
            &section.id,
            &SectionPatch::default(),
            &actor,
        );
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn locked_section_rejects_edits_until_unlocked() {
        let (db, actor, proposal_id) = setup();
        let repo = SectionRepo::new(db);
        let section = repo
            .create(&proposal_id, &section_input("Pricing", 1), &actor)
            .unwrap();

        repo.update(
            &proposal_id,
            &section.id,
            &SectionPatch {
                is_locked: Some(true),
                ..Default::default()
            },
            &actor,
        )
        .unwrap();

        let blocked = repo.update(
            &proposal_id,
            &section.id,
            &SectionPatch {
                content: Some("sneaky edit".into()),
                ..Default::default()
            },
            &actor,
        );
        assert!(matches!(blocked, Err(StoreError::Conflict(_))));

        let unlocked = repo
            .update(
                &proposal_id,
                &section.id,
                &SectionPatch {
                    is_locked: Some(false),
                    ..Default::default()
                },
                &actor,
            )
            .unwrap();
        assert!(!unlocked.is_locked);
        // lock, rejected edit (no bump), unlock => 3 accepted updates total
        assert_eq!(unlocked.version, 3);
    }

    #[test]
    fn list_orders_by_position_then_insertion() {
        let (db, actor, proposal_id) = setup();
        let repo = SectionRepo::new(db);
        repo.create(&proposal_id, &section_input("Second", 2), &actor)
            .unwrap();
        repo.create(&proposal_id, &section_input("First", 1), &actor)
            .unwrap();
        repo.create(&proposal_id, &section_input("Also first", 1), &actor)
            .unwrap();

        let sections = repo.list(&proposal_id).unwrap();
        let titles: Vec<&str> = sections.iter().map(|s| s.title.as_str()).collect();
        assert_eq!(titles, vec!["First", "Also first", "Second"]);
    }
}
