//! Server-held conversation session
//!
//! The session owns the persisted snapshot explicitly: it is loaded once at
//! startup, saved after every committed mutation and cleared on reset.

mod manager;
mod store;

pub use manager::{ResetError, SessionManager};
pub use store::{SnapshotStore, SqliteStore, StoreError};

#[cfg(test)]
pub(crate) use store::MemoryStore;

use crate::message::{Conversation, DurationMap, Message, PartInvariantError};
use crate::stream::AssembledMessage;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Storage key of the snapshot
pub const SNAPSHOT_KEY: &str = "parley.snapshot.v1";

/// The sole durable state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub messages: Conversation,
    #[serde(default)]
    pub durations: DurationMap,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Invariant(#[from] PartInvariantError),
    #[error("message {0} is still streaming")]
    NotFinal(String),
    #[error("failed to store snapshot: {0}")]
    Store(#[from] StoreError),
    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),
}

pub struct Session {
    store: Arc<dyn SnapshotStore>,
    snapshot: Snapshot,
}

impl Session {
    /// Load the snapshot; missing, unreadable or corrupt state starts empty
    pub fn load(store: Arc<dyn SnapshotStore>) -> Self {
        let snapshot = match store.get(SNAPSHOT_KEY) {
            Ok(Some(raw)) => decode(&raw).unwrap_or_else(|reason| {
                tracing::warn!(%reason, "Discarding corrupt session snapshot");
                Snapshot::default()
            }),
            Ok(None) => Snapshot::default(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session snapshot, starting empty");
                Snapshot::default()
            }
        };
        tracing::info!(messages = snapshot.messages.len(), "Session loaded");
        Self { store, snapshot }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn messages(&self) -> &[Message] {
        self.snapshot.messages.messages()
    }

    /// Append a finished message and save
    pub fn push_message(&mut self, message: Message) -> Result<(), SessionError> {
        if !message.status.is_final() {
            return Err(SessionError::NotFinal(message.id));
        }
        self.snapshot.messages.push(message)?;
        self.save()
    }

    /// Append an assembled assistant message with its reasoning timings
    pub fn commit(&mut self, assembled: AssembledMessage) -> Result<(), SessionError> {
        let AssembledMessage {
            message,
            reasoning_durations,
        } = assembled;
        if !message.status.is_final() {
            return Err(SessionError::NotFinal(message.id));
        }
        self.snapshot.messages.push(message)?;
        for (key, millis) in reasoning_durations {
            self.snapshot.durations.insert(key, millis);
        }
        self.save()
    }

    /// Clear everything, in memory and in the store
    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.snapshot = Snapshot::default();
        self.store.delete(SNAPSHOT_KEY)?;
        Ok(())
    }

    fn save(&self) -> Result<(), SessionError> {
        let raw = serde_json::to_string(&self.snapshot)?;
        self.store.put(SNAPSHOT_KEY, &raw)?;
        Ok(())
    }
}

fn decode(raw: &str) -> Result<Snapshot, String> {
    let snapshot: Snapshot = serde_json::from_str(raw).map_err(|e| e.to_string())?;
    snapshot
        .messages
        .validate()
        .map_err(|e| e.to_string())?;
    if let Some(open) = snapshot.messages.first_unfinished() {
        return Err(format!("message {} is still streaming", open.id));
    }
    Ok(snapshot)
}
