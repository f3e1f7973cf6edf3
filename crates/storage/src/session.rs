use async_trait::async_trait;
use crud::session::{PendingSubmission, SessionError, SessionId, SessionStore};

use crate::Storage;

/// Session store that keeps pending submissions in SQLite, so they survive
/// a restart between the failed save and the following edit.
#[derive(Clone)]
pub struct SqliteSessionStore {
    storage: Storage,
}

impl SqliteSessionStore {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }
}

fn internal(err: anyhow::Error) -> SessionError {
    SessionError(format!("{err:#}"))
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn put_pending(
        &self,
        session: &SessionId,
        pending: PendingSubmission,
    ) -> Result<(), SessionError> {
        self.storage
            .store_pending(session.as_str(), &pending.controller, &pending.data)
            .await
            .map_err(internal)
    }

    async fn take_pending(
        &self,
        session: &SessionId,
    ) -> Result<Option<PendingSubmission>, SessionError> {
        let stored = self
            .storage
            .consume_pending(session.as_str())
            .await
            .map_err(internal)?;
        Ok(stored.map(|stored| PendingSubmission {
            controller: stored.controller,
            data: stored.data,
        }))
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
