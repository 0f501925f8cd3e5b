//! Sequential-turn gatekeeper for the server-held session

use super::{Session, SessionError, Snapshot};
use crate::message::Message;
use crate::stream::AssembledMessage;
use crate::turn::TransitionError;
use std::sync::{Arc, Mutex, PoisonError};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct ActiveTurn {
    turn_id: String,
    cancel: CancellationToken,
}

type Slot = Arc<Mutex<Option<ActiveTurn>>>;

/// Slot holder while a reset is in progress
const RESET_SLOT: &str = "session-reset";

/// Holds the session and at most one active turn
pub struct SessionManager {
    session: tokio::sync::Mutex<Session>,
    active: Slot,
}

/// Proof of owning the session's turn slot; released on drop
pub struct TurnGuard {
    slot: Slot,
    turn_id: String,
    cancel: CancellationToken,
}

impl TurnGuard {
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

impl Drop for TurnGuard {
    fn drop(&mut self) {
        let mut active = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if active.as_ref().is_some_and(|a| a.turn_id == self.turn_id) {
            *active = None;
        }
    }
}

impl SessionManager {
    pub fn new(session: Session) -> Self {
        Self {
            session: tokio::sync::Mutex::new(session),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Claim the turn slot, or fail if another turn is still running
    pub fn begin_turn(&self, turn_id: &str) -> Result<TurnGuard, TransitionError> {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if active.is_some() {
            return Err(TransitionError::Busy);
        }
        let cancel = CancellationToken::new();
        *active = Some(ActiveTurn {
            turn_id: turn_id.to_string(),
            cancel: cancel.clone(),
        });
        Ok(TurnGuard {
            slot: Arc::clone(&self.active),
            turn_id: turn_id.to_string(),
            cancel,
        })
    }

    /// Cancel the active turn; returns its id if there was one
    pub fn stop(&self) -> Option<String> {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.as_ref().map(|turn| {
            turn.cancel.cancel();
            turn.turn_id.clone()
        })
    }

    pub fn active_turn(&self) -> Option<String> {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        active.as_ref().map(|turn| turn.turn_id.clone())
    }

    /// Append a user message and return the history the turn runs on
    pub async fn append_user(&self, text: &str) -> Result<Vec<Message>, SessionError> {
        let mut session = self.session.lock().await;
        session.push_message(Message::user(text))?;
        Ok(session.messages().to_vec())
    }

    pub async fn commit(&self, assembled: AssembledMessage) -> Result<(), SessionError> {
        self.session.lock().await.commit(assembled)
    }

    /// Clear the session; refused while a turn is running.
    ///
    /// The reset holds the turn slot itself, so no turn can begin until the
    /// session is empty.
    pub async fn reset(&self) -> Result<(), ResetError> {
        let _slot = self.begin_turn(RESET_SLOT).map_err(ResetError::Busy)?;
        self.session.lock().await.reset()?;
        Ok(())
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.session.lock().await.snapshot().clone()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ResetError {
    #[error(transparent)]
    Busy(TransitionError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
