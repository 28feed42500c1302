//! Registry error types
//!
//! Error types for room registry operations.

use std::time::Duration;

use super::key::SessionKey;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A room is already live under this key
    #[error("session already active: {0}")]
    SessionConflict(SessionKey),

    /// No room is live under this key
    #[error("session not found: {0}")]
    SessionNotFound(SessionKey),

    /// No room appeared under this key within the wait window
    #[error("no session {key} appeared within {waited:?}")]
    WaitTimedOut { key: SessionKey, waited: Duration },

    /// Key failed validation
    #[error("invalid session key: {0:?}")]
    InvalidKey(String),
}

impl RegistryError {
    /// True for every flavour of "there is nothing here"
    pub fn is_not_found(&self) -> bool {
        !matches!(self, RegistryError::SessionConflict(_))
    }
}
