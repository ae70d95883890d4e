use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Session ID not found. Please start the experiment again.")]
    MissingSessionId,
}

/// Identity of the running session, fixed for the lifetime of the process.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionContext {
    pub session_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    /// Sent with the first load request only, then cleared.
    pub resume_from_trial: Option<u32>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Self::default()
        }
    }

    pub fn require_id(&self) -> Result<&str, SessionError> {
        match self.session_id.as_deref() {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(SessionError::MissingSessionId),
        }
    }
}
