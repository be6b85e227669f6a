//! Session store with one serialized gate per identity.
//!
//! The map itself sits behind a short-lived std mutex that is never held
//! across an await; each session sits behind its own tokio mutex, held for
//! the whole of one user action. A second action for the same identity while
//! the first is still running is turned away with [`Busy`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::session::{Session, UserId};

/// Another action for this identity is still in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Busy {
    pub user_id: UserId,
}

impl fmt::Display for Busy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "user {} has an action in progress, try again", self.user_id)
    }
}

impl std::error::Error for Busy {}

#[derive(Debug, Clone)]
pub struct SessionHandle {
    user_id: UserId,
    inner: Arc<AsyncMutex<Session>>,
}

pub type SessionGuard = OwnedMutexGuard<Session>;

impl SessionHandle {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Take the gate or fail straight away.
    pub fn try_acquire(&self) -> Result<SessionGuard, Busy> {
        self.inner
            .clone()
            .try_lock_owned()
            .map_err(|_| Busy { user_id: self.user_id })
    }

    /// Wait for the gate. Used by callers that must not be turned away,
    /// such as shutdown snapshots.
    pub async fn acquire(&self) -> SessionGuard {
        self.inner.clone().lock_owned().await
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Arc<AsyncMutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for `user_id`, creating an empty session on first use.
    pub fn get(&self, user_id: UserId) -> SessionHandle {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let inner = sessions
            .entry(user_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(Session::new())))
            .clone();
        SessionHandle { user_id, inner }
    }

    /// Identities with a session, busy or idle.
    pub fn session_count(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or(0)
    }
}
