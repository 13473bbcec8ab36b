use thiserror::Error;

use crate::api::{AuthError, FetchError};
use crate::models::Backend;

/// Why a sync cycle produced no merge.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("No credentials configured for {0}")]
    MissingCredentials(Backend),

    #[error("Sync cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Auth(e) => e.user_message(),
            SyncError::Fetch(e) => e.user_message(),
            SyncError::MissingCredentials(backend) => {
                format!("Sign in to {} first", backend.display_name())
            }
            SyncError::Cancelled => "Stopped".to_string(),
        }
    }

    /// Whether the failure came from the orchestrator shutting down
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_delegates() {
        let e: SyncError = FetchError::Timeout.into();
        assert_eq!(e.user_message(), "Connection timed out");
        let e: SyncError = AuthError::InvalidCredentials.into();
        assert_eq!(e.user_message(), "Invalid email or password");
        assert!(SyncError::MissingCredentials(Backend::LibreLinkUp)
            .user_message()
            .contains("LibreLinkUp"));
    }
}
