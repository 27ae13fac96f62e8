//! Per-proposal chat rooms: the in-memory registry of live connections.
//!
//! Membership changes are synchronized by the map's shard locks; delivery
//! happens outside them through each connection's bounded queue, so one
//! slow or broken subscriber never stalls the rest of the room.

use std::collections::HashMap;

use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use forge_core::ids::ProposalId;

/// Unique identifier for one live chat connection.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Registry of live connections, keyed by proposal room.
pub struct RoomRegistry {
    rooms: DashMap<ProposalId, HashMap<ConnectionId, mpsc::Sender<String>>>,
    max_send_queue: usize,
}

impl RoomRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a connection under the proposal's room. No membership
    /// check happens at this layer: any connected client may join any
    /// room.
    pub fn subscribe(&self, proposal_id: &ProposalId) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.rooms
            .entry(proposal_id.clone())
            .or_default()
            .insert(id.clone(), tx);
        (id, rx)
    }

    /// Remove a connection from its room. An emptied room entry may
    /// remain; publish tolerates it.
    pub fn unsubscribe(&self, proposal_id: &ProposalId, connection: &ConnectionId) {
        if let Some(mut room) = self.rooms.get_mut(proposal_id) {
            room.remove(connection);
        }
    }

    /// Best-effort fan-out to every subscriber of the room. Senders are
    /// cloned out under the shard lock; delivery is non-blocking per
    /// connection, and a full or closed queue is skipped, never raised.
    /// Returns the number of queues the payload reached.
    pub fn publish(&self, proposal_id: &ProposalId, payload: &str) -> usize {
        let senders: Vec<(ConnectionId, mpsc::Sender<String>)> = match self.rooms.get(proposal_id)
        {
            Some(room) => room
                .iter()
                .map(|(id, tx)| (id.clone(), tx.clone()))
                .collect(),
            None => return 0,
        };

        let mut delivered = 0;
        for (connection, tx) in senders {
            match tx.try_send(payload.to_string()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        proposal_id = %proposal_id,
                        connection = %connection,
                        "send queue full, dropping chat payload"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    /// Current subscriber count for a room.
    pub fn room_size(&self, proposal_id: &ProposalId) -> usize {
        self.rooms
            .get(proposal_id)
            .map(|room| room.len())
            .unwrap_or(0)
    }
}
