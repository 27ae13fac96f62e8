pub mod activities;
pub mod approvals;
pub mod attachments;
pub mod chat;
pub mod comments;
pub mod database;
pub mod error;
pub mod knowledge;
pub mod organizations;
pub mod proposals;
pub mod row_helpers;
pub mod schema;
pub mod sections;
pub mod users;

pub use database::Database;
pub use error::StoreError;
