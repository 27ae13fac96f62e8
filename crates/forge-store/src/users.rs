use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use forge_core::ids::UserId;
use forge_core::tags;
use forge_core::types::UserRole;

use crate::database::Database;
use crate::error::StoreError;
use crate::row_helpers;

/// Default profile created alongside every new user. Elevated permissions
/// (e.g. "approve") are granted afterwards via set_profile.
const DEFAULT_DEPARTMENT: &str = "Sales";
const DEFAULT_PERMISSIONS: [&str; 2] = ["read", "write"];

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserRow {
    pub id: UserId,
    pub email: String,
    pub name: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub is_active: bool,
    pub created_at: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileRow {
    pub id: String,
    pub user_id: UserId,
    pub role: UserRole,
    pub department: String,
    pub permissions: Vec<String>,
    pub is_active: bool,
}

pub struct UserRepo {
    db: Database,
}

impl UserRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a user plus its default presales profile. The credential is
    /// hashed upstream; we store the opaque string.
    #[instrument(skip(self, password_hash), fields(email))]
    pub fn create(
        &self,
        email: &str,
        name: &str,
        password_hash: &str,
    ) -> Result<UserRow, StoreError> {
        let id = UserId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_tx(|tx| {
            let existing: Option<String> = tx
                .query_row("SELECT id FROM users WHERE email = ?1", [email], |row| {
                    row.get(0)
                })
                .ok();
            if existing.is_some() {
                return Err(StoreError::Conflict(format!(
                    "email {email} already registered"
                )));
            }

            tx.execute(
                "INSERT INTO users (id, email, name, password_hash, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, 1, ?5)",
                rusqlite::params![id.as_str(), email, name, password_hash, now],
            )?;

            let default_permissions: Vec<String> =
                DEFAULT_PERMISSIONS.iter().map(|p| p.to_string()).collect();
            tx.execute(
                "INSERT INTO user_profiles (id, user_id, role, department, permissions, is_active)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                rusqlite::params![
                    uuid::Uuid::now_v7().to_string(),
                    id.as_str(),
                    UserRole::Presales.to_string(),
                    DEFAULT_DEPARTMENT,
                    tags::encode(&default_permissions)?,
                ],
            )?;

            Ok(UserRow {
                id: id.clone(),
                email: email.to_string(),
                name: name.to_string(),
                password_hash: password_hash.to_string(),
                is_active: true,
                created_at: now.clone(),
            })
        })
    }

    /// Get a user by ID.
    #[instrument(skip(self), fields(user_id = %id))]
    pub fn get(&self, id: &UserId) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| fetch_user(conn, id.as_str()))
    }

    /// Get a user by email.
    #[instrument(skip(self), fields(email))]
    pub fn get_by_email(&self, email: &str) -> Result<UserRow, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, email, name, password_hash, is_active, created_at
                 FROM users WHERE email = ?1",
            )?;
            let mut rows = stmt.query([email])?;
            match rows.next()? {
                Some(row) => row_to_user(row),
                None => Err(StoreError::NotFound(format!("user with email {email}"))),
            }
        })
    }

    /// Get a user's profile, if one exists.
    #[instrument(skip(self), fields(user_id = %user_id))]
    pub fn profile(&self, user_id: &UserId) -> Result<Option<ProfileRow>, StoreError> {
        self.db.with_conn(|conn| fetch_profile(conn, user_id.as_str()))
    }

    /// Replace a user's profile (role, department, permission tokens).
    #[instrument(skip(self, permissions), fields(user_id = %user_id, role = %role))]
    pub fn set_profile(
        &self,
        user_id: &UserId,
        role: UserRole,
        department: &str,
        permissions: &[String],
    ) -> Result<ProfileRow, StoreError> {
        self.db.with_tx(|tx| {
            fetch_user(tx, user_id.as_str())?;

            let encoded = tags::encode(permissions)?;
            let updated = tx.execute(
                "UPDATE user_profiles SET role = ?1, department = ?2, permissions = ?3
                 WHERE user_id = ?4",
                rusqlite::params![role.to_string(), department, encoded, user_id.as_str()],
            )?;
            if updated == 0 {
                tx.execute(
                    "INSERT INTO user_profiles (id, user_id, role, department, permissions, is_active)
                     VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                    rusqlite::params![
                        uuid::Uuid::now_v7().to_string(),
                        user_id.as_str(),
                        role.to_string(),
                        department,
                        encoded,
                    ],
                )?;
            }

            match fetch_profile(tx, user_id.as_str())? {
                Some(profile) => Ok(profile),
                None => Err(StoreError::NotFound(format!("profile for user {user_id}"))),
            }
        })
    }
}

pub(crate) fn fetch_user(conn: &Connection, id: &str) -> Result<UserRow, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, email, name, password_hash, is_active, created_at
         FROM users WHERE id = ?1",
    )?;
    let mut rows = stmt.query([id])?;
    match rows.next()? {
        Some(row) => row_to_user(row),
        None => Err(StoreError::NotFound(format!("user {id}"))),
    }
}

pub(crate) fn fetch_profile(
    conn: &Connection,
    user_id: &str,
) -> Result<Option<ProfileRow>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, role, department, permissions, is_active
         FROM user_profiles WHERE user_id = ?1",
    )?;
    let mut rows = stmt.query([user_id])?;
    match rows.next()? {
        Some(row) => {
            let role_str: String = row_helpers::get(row, 2, "user_profiles", "role")?;
            let permissions_raw: String =
                row_helpers::get(row, 4, "user_profiles", "permissions")?;
            Ok(Some(ProfileRow {
                id: row_helpers::get(row, 0, "user_profiles", "id")?,
                user_id: UserId::from_raw(row_helpers::get::<String>(
                    row,
                    1,
                    "user_profiles",
                    "user_id",
                )?),
                role: row_helpers::parse_enum(&role_str, "user_profiles", "role")?,
                department: row_helpers::get(row, 3, "user_profiles", "department")?,
                permissions: row_helpers::parse_string_list(
                    &permissions_raw,
                    "user_profiles",
                    "permissions",
                )?,
                is_active: row_helpers::get::<bool>(row, 5, "user_profiles", "is_active")?,
            }))
        }
        None => Ok(None),
    }
}

pub(crate) fn row_to_user(row: &rusqlite::Row<'_>) -> Result<UserRow, StoreError> {
    Ok(UserRow {
        id: UserId::from_raw(row_helpers::get::<String>(row, 0, "users", "id")?),
        email: row_helpers::get(row, 1, "users", "email")?,
        name: row_helpers::get(row, 2, "users", "name")?,
        password_hash: row_helpers::get(row, 3, "users", "password_hash")?,
        is_active: row_helpers::get::<bool>(row, 4, "users", "is_active")?,
        created_at: row_helpers::get(row, 5, "users", "created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::in_memory().unwrap()
    }

    #[test]
    fn create_user() {
        let repo = UserRepo::new(test_db());
        let user = repo.create("amina@acme.com", "Amina", "hash123").unwrap();
        assert!(user.id.as_str().starts_with("usr_"));
        assert_eq!(user.email, "amina@acme.com");
        assert!(user.is_active);
    }

    #[test]
    fn create_also_creates_default_profile() {
        let repo = UserRepo::new(test_db());
        let user = repo.create("amina@acme.com", "Amina", "hash123").unwrap();
        let profile = repo.profile(&user.id).unwrap().unwrap();
        assert_eq!(profile.role, UserRole::Presales);
        assert_eq!(profile.department, "Sales");
        assert_eq!(profile.permissions, vec!["read", "write"]);
    }

    #[test]
    fn duplicate_email_conflicts() {
        let repo = UserRepo::new(test_db());
        repo.create("amina@acme.com", "Amina", "hash123").unwrap();
        let result = repo.create("amina@acme.com", "Other", "hash456");
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[test]
    fn duplicate_email_leaves_no_partial_rows() {
        let db = test_db();
        let repo = UserRepo::new(db.clone());
        repo.create("amina@acme.com", "Amina", "hash123").unwrap();
        let _ = repo.create("amina@acme.com", "Other", "hash456");

        let count: i64 = db
            .with_conn(|conn| {
                conn.query_row("SELECT COUNT(*) FROM user_profiles", [], |row| row.get(0))
                    .map_err(StoreError::from)
            })
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn get_by_id_and_email() {
        let repo = UserRepo::new(test_db());
        let user = repo.create("amina@acme.com", "Amina", "hash123").unwrap();
        assert_eq!(repo.get(&user.id).unwrap().email, "amina@acme.com");
        assert_eq!(repo.get_by_email("amina@acme.com").unwrap().id, user.id);
    }

    #[test]
    fn get_nonexistent_fails() {
        let repo = UserRepo::new(test_db());
        let result = repo.get(&UserId::from_raw("usr_nonexistent"));
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[test]
    fn password_hash_not_serialized() {
        let repo = UserRepo::new(test_db());
        let user = repo.create("amina@acme.com", "Amina", "secret-hash").unwrap();
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("secret-hash"));
        assert!(!json.contains("password_hash"));
    }

    #[test]
    fn set_profile_replaces_existing() {
        let repo = UserRepo::new(test_db());
        let user = repo.create("amina@acme.com", "Amina", "hash123").unwrap();
        let permissions = vec!["read".to_string(), "write".to_string(), "approve".to_string()];
        let profile = repo
            .set_profile(&user.id, UserRole::Manager, "Delivery", &permissions)
            .unwrap();
        assert_eq!(profile.role, UserRole::Manager);
        assert!(profile.permissions.contains(&"approve".to_string()));

        // Still a single profile row
        let again = repo.profile(&user.id).unwrap().unwrap();
        assert_eq!(again.department, "Delivery");
    }

    #[test]
    fn set_profile_unknown_user_fails() {
        let repo = UserRepo::new(test_db());
        let result = repo.set_profile(
            &UserId::from_raw("usr_nonexistent"),
            UserRole::Admin,
            "Ops",
            &[],
        );
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }
}
