//! Durable chat history per proposal. Live fan-out happens in the server's
//! room registry; persisting here and broadcasting there are independent
//! paths — a REST-posted message is not pushed to live subscribers.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use forge_core::ids::{ChatMessageId, ProposalId, UserId};

use crate::database::Database;
use crate::error::StoreError;
use crate::proposals;
use crate::row_helpers;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessageRow {
    pub id: ChatMessageId,
    pub proposal_id: ProposalId,
    pub sender_id: UserId,
    pub message: String,
    pub timestamp: String,
}

pub struct ChatRepo {
    db: Database,
}

impl ChatRepo {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Persist one message. Messages are immutable once written.
    #[instrument(skip(self, message), fields(proposal_id = %proposal_id, sender = %sender))]
    pub fn post(
        &self,
        proposal_id: &ProposalId,
        sender: &UserId,
        message: &str,
    ) -> Result<ChatMessageRow, StoreError> {
        let id = ChatMessageId::new();
        let now = Utc::now().to_rfc3339();

        self.db.with_tx(|tx| {
            proposals::ensure_proposal(tx, proposal_id.as_str())?;

            tx.execute(
                "INSERT INTO chat_messages (id, proposal_id, sender_id, message, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![
                    id.as_str(),
                    proposal_id.as_str(),
                    sender.as_str(),
                    message,
                    now,
                ],
            )?;

            Ok(ChatMessageRow {
                id: id.clone(),
                proposal_id: proposal_id.clone(),
                sender_id: sender.clone(),
                message: message.to_string(),
                timestamp: now.clone(),
            })
        })
    }

    /// Full history, oldest first, unpaginated.
    #[instrument(skip(self), fields(proposal_id = %proposal_id))]
    pub fn history(&self, proposal_id: &ProposalId) -> Result<Vec<ChatMessageRow>, StoreError> {
        self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, proposal_id, sender_id, message, timestamp
                 FROM chat_messages WHERE proposal_id = ?1
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let mut rows = stmt.query([proposal_id.as_str()])?;
            let mut results = Vec::new();
            while let Some(row) = rows.next()? {
                results.push(row_to_message(row)?);
            }
            Ok(results)
        })
    }
}

fn row_to_message(row: &rusqlite::Row<'_>) -> Result<ChatMessageRow, StoreError> {
    Ok(ChatMessageRow {
        id: ChatMessageId::from_raw(row_helpers::get::<String>(row, 0, "chat_messages", "id")?),
        proposal_id: ProposalId::from_raw(row_helpers::get::<String>(
            row,
            1,
            "chat_messages",
            "proposal_id",
        )?),
        sender_id: UserId::from_raw(row_helpers::get::<String>(
            row,
            2,
            "chat_messages",
            "sender_id",
        )?),
        message: row_helpers::get(row, 3, "chat_messages", "message")?,
        timestamp: row_helpers::get(row, 4, "chat_messages", "timestamp")?,
    })
}
