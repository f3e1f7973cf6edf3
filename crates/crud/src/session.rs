use std::{collections::HashMap, fmt};

use async_trait::async_trait;
use shared::domain::FieldMap;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Raw posted data kept across a failed-validation redirect.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSubmission {
    pub controller: String,
    pub data: FieldMap,
}

#[derive(Debug, Error)]
#[error("session store failure: {0}")]
pub struct SessionError(pub String);

/// Per-user storage that survives between requests. Each session holds at
/// most one pending submission: storing replaces it, taking clears it.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn put_pending(
        &self,
        session: &SessionId,
        pending: PendingSubmission,
    ) -> Result<(), SessionError>;

    async fn take_pending(
        &self,
        session: &SessionId,
    ) -> Result<Option<PendingSubmission>, SessionError>;
}

/// The session of the request being handled.
#[derive(Clone, Copy)]
pub struct SessionContext<'a> {
    pub id: &'a SessionId,
    pub store: &'a dyn SessionStore,
}

impl<'a> SessionContext<'a> {
    pub fn new(id: &'a SessionId, store: &'a dyn SessionStore) -> Self {
        Self { id, store }
    }

    pub async fn stash(&self, controller: &str, data: FieldMap) -> Result<(), SessionError> {
        self.store
            .put_pending(
                self.id,
                PendingSubmission {
                    controller: controller.to_string(),
                    data,
                },
            )
            .await
    }

    /// Consumes the pending submission. Data stashed by another controller is
    /// discarded rather than returned.
    pub async fn take_for(&self, controller: &str) -> Result<Option<FieldMap>, SessionError> {
        match self.store.take_pending(self.id).await? {
            Some(pending) if pending.controller == controller => Ok(Some(pending.data)),
            Some(pending) => {
                debug!(
                    session = %self.id,
                    stashed_by = %pending.controller,
                    controller,
                    "discarding pending submission of another controller"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }
}

#[derive(Default)]
pub struct MemorySessionStore {
    slots: Mutex<HashMap<SessionId, PendingSubmission>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn has_pending(&self, session: &SessionId) -> bool {
        self.slots.lock().await.contains_key(session)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn put_pending(
        &self,
        session: &SessionId,
        pending: PendingSubmission,
    ) -> Result<(), SessionError> {
        self.slots.lock().await.insert(session.clone(), pending);
        Ok(())
    }

    async fn take_pending(
        &self,
        session: &SessionId,
    ) -> Result<Option<PendingSubmission>, SessionError> {
        Ok(self.slots.lock().await.remove(session))
    }
}
