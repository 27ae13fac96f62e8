use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use forge_core::ids::{OrgId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrgRow {
    pub id: OrgId,
    pub name: String,
    pub industry: String,
    pub size: String,
    pub description: Option<String>,
    pub created_by: UserId,
    pub created_at: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewOrganization {
    pub name: String,
    pub industry: String,
    pub size: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub struct OrgRepo {
    db: Database,
}

impl OrgRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    #[instrument(skip(self, input), fields(name = %input.name, actor = %actor))]
    pub fn create(&self, input: &NewOrganization, actor: &UserId) -> Result<OrgRow, StoreError> {
        let id = OrgId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO organizations (id, name, industry, size, description, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    id.as_str(),
                    input.name,
                    input.industry,
                    input.size,
                    input.description,
                    actor.as_str(),
                    now,
                ],
            )?;

            Ok(OrgRow {
                id: id.clone(),
                name: input.name.clone(),
                industry: input.industry.clone(),
                size: input.size.clone(),
                description: input.description.clone(),
                created_by: actor.clone(),
                created_at: now.clone(),
            })
        })
    }

    #[instrument(skip(self), fields(org_id = %id))]
    pub fn get(&self, id: &OrgId) -> Result<OrgRow, StoreError> {
        self.db.with_conn(|conn| fetch_org(conn, id.as_str()))
    }

    /// List organizations, newest first.
    #[instrument(skip(self))]
    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<OrgRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, industry, size, description, created_by, created_at
                 FROM organizations ORDER BY created_at DESC, id DESC
                 LIMIT ?1 OFFSET ?2",
            )?;
            let mut rows = stmt.query(rusqlite::params![limit, offset])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_org(row)?);
            }
            Ok(results)
        })
    }
}

pub(crate) fn fetch_org(conn: &Connection, id: &str) -> Result<OrgRow, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, name, industry, size, description, created_by, created_at
         FROM organizations WHERE id = ?1",
    )?;
    let mut rows = stmt.query([id])?;
    match rows.next()? {
        Some(row) => row_to_org(row),
        None => Err(StoreError::NotFound(format!("organization {id}"))),
    }
}

fn row_to_org(row: &rusqlite::Row<'_>) -> Result<OrgRow, StoreError> {
    Ok(OrgRow {
        id: OrgId::from_raw(row_helpers::get::<String>(row, 0, "organizations", "id")?),
        name: row_helpers::get(row, 1, "organizations", "name")?,
        industry: row_helpers::get(row, 2, "organizations", "industry")?,
        size: row_helpers::get(row, 3, "organizations", "size")?,
        description: row_helpers::get_opt(row, 4, "organizations", "description")?,
        created_by: UserId::from_raw(row_helpers::get::<String>(
            row,
            5,
            "organizations",
            "created_by",
        )?),
        created_at: row_helpers::get(row, 6, "organizations", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::UserRepo;

    fn setup() -> (Database, UserId) {
        let db = Database::in_memory().unwrap();
        let users = UserRepo::new(db.clone());
        let user = users.create("amina@acme.com", "Amina", "hash").unwrap();
        (db, user.id)
    }

    fn org_input(name: &str) -> NewOrganization {
        NewOrganization {
            name: name.to_string(),
            industry: "software".to_string(),
            size: "200-500".to_string(),
            description: None,
        }
    }

    #[test]
    fn create_org() {
        let (db, actor) = setup();
        let repo = OrgRepo::new(db);
        let org = repo.create(&org_input("Acme"), &actor).unwrap();
        assert!(org.id.as_str().starts_with("org_"));
        assert_eq!(org.name, "Acme");
        assert_eq!(org.created_by, actor);
    }

    #[test]
    fn get_org() {
        let (db, actor) = setup();
        let repo = OrgRepo::new(db);
        let org = repo.create(&org_input("Acme"), &actor).unwrap();
        let fetched = repo.get(&org.id).unwrap();
        assert_eq!(fetched.industry, "software");
    }

    #[test]
    fn get_nonexistent_fails() {
        let (db, _) = setup();
        let repo = OrgRepo::new(db);
        let result = repo.get(&OrgId::from_raw("org_nonexistent"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn list_with_pagination() {
        let (db, actor) = setup();
        let repo = OrgRepo::new(db);
        for i in 0..5 {
            repo.create(&org_input(&format!("Org {i}")), &actor).unwrap();
        }
        let page1 = repo.list(2, 0).unwrap();
        assert_eq!(page1.len(), 2);
        let page3 = repo.list(2, 4).unwrap();
        assert_eq!(page3.len(), 1);
    }
}
