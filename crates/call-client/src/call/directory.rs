//! Lookup of call sessions created by the surrounding application.

use crate::errors::ClientError;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Who is calling whom, and in which room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSession {
    pub call_id: String,
    pub room_id: String,
    pub caller_id: String,
    pub callee_id: String,
    pub created_at: DateTime<Utc>,
}

impl CallSession {
    #[must_use]
    pub fn new(
        call_id: impl Into<String>,
        room_id: impl Into<String>,
        caller_id: impl Into<String>,
        callee_id: impl Into<String>,
    ) -> Self {
        Self {
            call_id: call_id.into(),
            room_id: room_id.into(),
            caller_id: caller_id.into(),
            callee_id: callee_id.into(),
            created_at: Utc::now(),
        }
    }
}

/// Source of call sessions.
#[async_trait::async_trait]
pub trait CallDirectory: Send + Sync {
    /// Fetch the session for `call_id`.
    ///
    /// Returns `ClientError::CallNotFound` for unknown ids.
    async fn fetch(&self, call_id: &str) -> Result<CallSession, ClientError>;
}

/// Directory backed by a map.
#[derive(Debug, Default)]
pub struct InMemoryCallDirectory {
    sessions: RwLock<HashMap<String, CallSession>>,
}

impl InMemoryCallDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: CallSession) {
        self.sessions
            .write()
            .await
            .insert(session.call_id.clone(), session);
    }

    pub async fn remove(&self, call_id: &str) -> Option<CallSession> {
        self.sessions.write().await.remove(call_id)
    }
}

#[async_trait::async_trait]
impl CallDirectory for InMemoryCallDirectory {
    async fn fetch(&self, call_id: &str) -> Result<CallSession, ClientError> {
        self.sessions
            .read()
            .await
            .get(call_id)
            .cloned()
            .ok_or_else(|| ClientError::CallNotFound(call_id.to_string()))
    }
}
