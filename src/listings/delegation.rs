use std::sync::Arc;

use tracing::{debug, info, warn};

use super::domain::{Account, AccountId, Principal, Role, SiteId, SubscriptionTier};
use super::repository::{AccountRepository, RepositoryError};

/// Per-request record of who acts and who owns the resulting listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationContext {
    pub acting: Principal,
    pub owner: Account,
    pub delegated: bool,
}

impl DelegationContext {
    pub fn for_self(acting: Principal) -> Self {
        let owner = acting.account.clone();
        Self {
            acting,
            owner,
            delegated: false,
        }
    }

    pub fn owner_id(&self) -> &AccountId {
        &self.owner.id
    }

    pub fn author_id(&self) -> &AccountId {
        self.acting.id()
    }

    pub fn owner_role(&self) -> Role {
        self.owner.role
    }

    pub fn owner_tier(&self) -> SubscriptionTier {
        self.owner.tier
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DelegationError {
    #[error("target account {0} does not exist")]
    TargetNotFound(AccountId),
    #[error("administrators of site {acting_site} cannot act for accounts on site {target_site}")]
    TerritoryViolation {
        acting_site: SiteId,
        target_site: SiteId,
    },
}

/// Decides whether a "create for user" request is honoured.
pub struct DelegationValidator {
    accounts: Arc<dyn AccountRepository>,
}

impl DelegationValidator {
    pub fn new(accounts: Arc<dyn AccountRepository>) -> Self {
        Self { accounts }
    }

    pub fn resolve(
        &self,
        acting: Principal,
        target: Option<&AccountId>,
    ) -> Result<DelegationContext, DelegationError> {
        let Some(target_id) = target else {
            return Ok(DelegationContext::for_self(acting));
        };

        if !acting.capabilities.delegate {
            debug!(
                acting = %acting.id(),
                target = %target_id,
                "ignoring target account from caller without delegation rights"
            );
            return Ok(DelegationContext::for_self(acting));
        }

        if target_id == acting.id() {
            return Ok(DelegationContext::for_self(acting));
        }

        let target = match self.accounts.fetch(target_id) {
            Ok(Some(account)) => account,
            Ok(None) | Err(RepositoryError::NotFound) => {
                return Err(DelegationError::TargetNotFound(target_id.clone()))
            }
            Err(err) => {
                warn!(
                    acting = %acting.id(),
                    target = %target_id,
                    error = %err,
                    "target lookup failed; continuing without delegation"
                );
                return Ok(DelegationContext::for_self(acting));
            }
        };

        if !acting.capabilities.delegate_cross_site && target.site_id != *acting.site() {
            return Err(DelegationError::TerritoryViolation {
                acting_site: acting.site().clone(),
                target_site: target.site_id,
            });
        }

        info!(
            acting = %acting.id(),
            owner = %target.id,
            owner_role = %target.role,
            "creating listing on behalf of another account"
        );

        Ok(DelegationContext {
            acting,
            owner: target,
            delegated: true,
        })
    }
}
