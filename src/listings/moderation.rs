use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{info, warn};

use super::domain::{ListingId, ListingRecord, ListingStatus, Principal, SiteId};
use super::repository::{ListingPorts, OwnerNotice, RepositoryError};

const MAX_QUEUE_PAGE: usize = 200;

#[derive(Debug, thiserror::Error)]
pub enum ModerationError {
    #[error("account {0} may not moderate listings")]
    InsufficientRole(String),
    #[error("listing {0} not found")]
    ListingNotFound(ListingId),
    #[error("moderators of site {moderator_site} cannot act on listings from site {listing_site}")]
    TerritoryViolation {
        moderator_site: SiteId,
        listing_site: SiteId,
    },
    #[error("cannot move listing from {from} to {to}")]
    InvalidTransition {
        from: ListingStatus,
        to: ListingStatus,
    },
    #[error("listing {0} has no images and cannot be published")]
    MissingMedia(ListingId),
    #[error("a rejection reason is required")]
    MissingReason,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Result of a moderation action, echoed to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModerationOutcome {
    pub listing_id: ListingId,
    pub previous_status: ListingStatus,
    pub status: ListingStatus,
    pub changed: bool,
}

/// Administrator-facing state transitions for listings.
pub struct ModerationService {
    ports: ListingPorts,
}

impl ModerationService {
    pub fn new(ports: ListingPorts) -> Self {
        Self { ports }
    }

    pub fn approve(
        &self,
        moderator: &Principal,
        listing_id: &ListingId,
    ) -> Result<ModerationOutcome, ModerationError> {
        let listing = self.load_for(moderator, listing_id)?;
        if listing.status == ListingStatus::Active {
            return Ok(unchanged(&listing));
        }
        self.ensure_transition(&listing, ListingStatus::Active)?;

        if self.ports.media.for_listing(listing_id)?.is_empty() {
            return Err(ModerationError::MissingMedia(listing_id.clone()));
        }

        let updated = self
            .ports
            .listings
            .update_status(listing_id, ListingStatus::Active, None)?;

        info!(listing_id = %listing_id, moderator = %moderator.id(), "listing approved");
        self.notify_owner(&updated, "listing_approved", None);

        Ok(changed(&listing, &updated))
    }

    pub fn reject(
        &self,
        moderator: &Principal,
        listing_id: &ListingId,
        reason: &str,
    ) -> Result<ModerationOutcome, ModerationError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(ModerationError::MissingReason);
        }

        let listing = self.load_for(moderator, listing_id)?;
        if listing.status == ListingStatus::Rejected {
            return Ok(unchanged(&listing));
        }
        self.ensure_transition(&listing, ListingStatus::Rejected)?;

        let updated = self.ports.listings.update_status(
            listing_id,
            ListingStatus::Rejected,
            Some(reason.to_string()),
        )?;

        info!(listing_id = %listing_id, moderator = %moderator.id(), "listing rejected");
        self.notify_owner(&updated, "listing_rejected", Some(reason));

        Ok(changed(&listing, &updated))
    }

    /// Generic status update; approve and reject keep their idempotent semantics.
    pub fn update_status(
        &self,
        moderator: &Principal,
        listing_id: &ListingId,
        target: ListingStatus,
        reason: Option<&str>,
    ) -> Result<ModerationOutcome, ModerationError> {
        match target {
            ListingStatus::Active => self.approve(moderator, listing_id),
            ListingStatus::Rejected => self.reject(moderator, listing_id, reason.unwrap_or("")),
            _ => {
                let listing = self.load_for(moderator, listing_id)?;
                if listing.status == target {
                    return Ok(unchanged(&listing));
                }
                self.ensure_transition(&listing, target)?;
                if listing.is_draft() && self.ports.media.for_listing(listing_id)?.is_empty() {
                    return Err(ModerationError::MissingMedia(listing_id.clone()));
                }
                let updated = self.ports.listings.update_status(listing_id, target, None)?;
                info!(listing_id = %listing_id, status = %target, "listing status updated");
                Ok(changed(&listing, &updated))
            }
        }
    }

    /// Administrative delete from any state. Media rows go first so none dangle.
    pub fn remove(
        &self,
        moderator: &Principal,
        listing_id: &ListingId,
    ) -> Result<ListingRecord, ModerationError> {
        let listing = self.load_for(moderator, listing_id)?;
        let removed_media = self.ports.media.delete_for_listing(listing_id)?;
        self.ports.listings.delete(listing_id)?;

        info!(
            listing_id = %listing_id,
            moderator = %moderator.id(),
            removed_media,
            "listing removed"
        );
        Ok(listing)
    }

    /// Pending listings visible to the moderator, oldest first.
    pub fn queue(
        &self,
        moderator: &Principal,
        limit: usize,
    ) -> Result<Vec<ListingRecord>, ModerationError> {
        Self::ensure_moderator(moderator)?;
        let site = (!moderator.capabilities.moderate_cross_site).then(|| moderator.site());
        let limit = limit.clamp(1, MAX_QUEUE_PAGE);
        Ok(self.ports.listings.pending(site, limit)?)
    }

    fn ensure_moderator(moderator: &Principal) -> Result<(), ModerationError> {
        if moderator.capabilities.moderate {
            Ok(())
        } else {
            Err(ModerationError::InsufficientRole(moderator.id().to_string()))
        }
    }

    fn load_for(
        &self,
        moderator: &Principal,
        listing_id: &ListingId,
    ) -> Result<ListingRecord, ModerationError> {
        Self::ensure_moderator(moderator)?;

        let listing = self
            .ports
            .listings
            .fetch(listing_id)?
            .ok_or_else(|| ModerationError::ListingNotFound(listing_id.clone()))?;

        if !moderator.capabilities.moderate_cross_site && listing.site_id != *moderator.site() {
            return Err(ModerationError::TerritoryViolation {
                moderator_site: moderator.site().clone(),
                listing_site: listing.site_id,
            });
        }

        Ok(listing)
    }

    fn ensure_transition(
        &self,
        listing: &ListingRecord,
        target: ListingStatus,
    ) -> Result<(), ModerationError> {
        if listing.status.can_transition_to(target) {
            Ok(())
        } else {
            Err(ModerationError::InvalidTransition {
                from: listing.status,
                to: target,
            })
        }
    }

    fn notify_owner(&self, listing: &ListingRecord, template: &str, reason: Option<&str>) {
        let recipient = match self.ports.accounts.fetch(&listing.owner_id) {
            Ok(account) => account.map(|account| account.email),
            Err(err) => {
                warn!(owner = %listing.owner_id, error = %err, "owner lookup failed for notification");
                None
            }
        };

        let mut details = BTreeMap::new();
        details.insert("title".to_string(), listing.title.clone());
        details.insert("status".to_string(), listing.status.label().to_string());
        if let Some(reason) = reason {
            details.insert("reason".to_string(), reason.to_string());
        }

        let notice = OwnerNotice {
            template: template.to_string(),
            listing_id: listing.id.clone(),
            recipient,
            details,
        };

        if let Err(err) = self.ports.notifier.notify(notice) {
            warn!(listing_id = %listing.id, error = %err, "owner notification failed");
        }
    }
}

fn unchanged(listing: &ListingRecord) -> ModerationOutcome {
    ModerationOutcome {
        listing_id: listing.id.clone(),
        previous_status: listing.status,
        status: listing.status,
        changed: false,
    }
}

fn changed(before: &ListingRecord, after: &ListingRecord) -> ModerationOutcome {
    ModerationOutcome {
        listing_id: after.id.clone(),
        previous_status: before.status,
        status: after.status,
        changed: true,
    }
}
