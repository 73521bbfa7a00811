use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthzError {
    /// The only failure raised by the engine itself. The message names the
    /// verb and subject type, never the condition that failed.
    #[error("not allowed to {action} {subject}")]
    Denied { action: String, subject: String },
    /// Failure of the record fetch, passed through untouched.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl AuthzError {
    pub fn denied(action: impl Into<String>, subject: impl Into<String>) -> Self {
        Self::Denied {
            action: action.into(),
            subject: subject.into(),
        }
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, Self::Denied { .. })
    }
}
