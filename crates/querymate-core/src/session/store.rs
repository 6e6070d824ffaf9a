use crate::error::StoreError;
use crate::session::ContextSession;

/// Trait for context-session storage backends. One row per account email;
/// concurrent writers race with last-write-wins semantics.
pub trait SessionStore: Send + Sync {
    /// Load the session for an account, if one exists.
    fn get(&self, email: &str) -> Option<ContextSession>;

    /// Persist a session, replacing any prior row for the same email.
    fn save(&self, session: &ContextSession) -> Result<(), StoreError>;

    /// Delete the session row. Returns whether a row existed.
    fn delete(&self, email: &str) -> bool;
}
