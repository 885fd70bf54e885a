use std::sync::Arc;

use tracing::debug;

use super::domain::{AccountId, Principal};
use super::repository::{AccountRepository, RepositoryError, SessionStore};

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("missing or invalid credential")]
    Unauthenticated,
    #[error("no account profile for session owner {0}")]
    ProfileNotFound(AccountId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Authenticates the caller and loads the profile with its capabilities.
pub struct IdentityResolver {
    sessions: Arc<dyn SessionStore>,
    accounts: Arc<dyn AccountRepository>,
}

impl IdentityResolver {
    pub fn new(sessions: Arc<dyn SessionStore>, accounts: Arc<dyn AccountRepository>) -> Self {
        Self { sessions, accounts }
    }

    pub fn resolve(&self, credential: Option<&str>) -> Result<Principal, IdentityError> {
        let credential = credential
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(IdentityError::Unauthenticated)?;

        let account_id = self
            .sessions
            .resolve(credential)?
            .ok_or(IdentityError::Unauthenticated)?;

        let account = self
            .accounts
            .fetch(&account_id)?
            .ok_or_else(|| IdentityError::ProfileNotFound(account_id.clone()))?;

        debug!(account_id = %account.id, role = %account.role, "resolved caller");
        Ok(Principal::from_account(account))
    }
}
