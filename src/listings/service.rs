use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::PoisonError;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::approval::ApprovalPolicy;
use super::commit::{CommitCoordinator, CommitPlan};
use super::delegation::{DelegationContext, DelegationValidator};
use super::domain::{
    AccountId, Attestation, ListingId, ListingRecord, ListingStatus, MediaRecord, Principal,
    SiteId,
};
use super::error::SubmissionError;
use super::identity::IdentityResolver;
use super::media::{MediaIngestor, UploadScope};
use super::moderation::ModerationService;
use super::normalizer::{CanonicalListing, ListingNormalizer, RawSubmission};
use super::quota::{OwnerLocks, QuotaCheck, QuotaEnforcer};
use super::repository::{ListingPorts, OwnerNotice};
use super::sanitize::DegradedToNull;
use crate::config::{AppEnvironment, ListingPolicy};

static LISTING_SEQUENCE: AtomicU64 = AtomicU64::new(1);

/// Millisecond clock plus an in-process counter, so ids from a restarted
/// process do not reuse earlier ones.
fn next_listing_id() -> ListingId {
    let sequence = LISTING_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let millis = Utc::now().timestamp_millis();
    ListingId(format!("lst-{millis:x}-{sequence:06}"))
}

/// One inbound submission as seen by the HTTP layer.
#[derive(Debug, Clone, Default)]
pub struct SubmissionRequest {
    pub credential: Option<String>,
    pub client_ip: Option<IpAddr>,
    pub payload: RawSubmission,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MediaLinkSummary {
    pub attempted: usize,
    pub linked: usize,
}

/// Response body of a successful submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReceipt {
    pub listing_id: ListingId,
    pub status: ListingStatus,
    pub message: &'static str,
    pub media: MediaLinkSummary,
    pub degraded_fields: Vec<DegradedToNull>,
    pub delegated: bool,
    pub owner_id: AccountId,
    pub quota: QuotaCheck,
}

/// A listing together with its media rows.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingView {
    pub listing: ListingRecord,
    pub media: Vec<MediaRecord>,
}

/// Facade running the whole submission pipeline for one request at a time.
pub struct ListingSubmissionService {
    ports: ListingPorts,
    identity: IdentityResolver,
    delegation: DelegationValidator,
    normalizer: ListingNormalizer,
    quota: QuotaEnforcer,
    approval: ApprovalPolicy,
    media: MediaIngestor,
    commit: CommitCoordinator,
    moderation: ModerationService,
    locks: OwnerLocks,
    environment: AppEnvironment,
}

impl ListingSubmissionService {
    pub fn new(ports: ListingPorts, policy: ListingPolicy, environment: AppEnvironment) -> Self {
        let ListingPolicy {
            quota,
            approval,
            tenants,
            image_ceilings,
        } = policy;

        Self {
            identity: IdentityResolver::new(ports.sessions.clone(), ports.accounts.clone()),
            delegation: DelegationValidator::new(ports.accounts.clone()),
            normalizer: ListingNormalizer::new(tenants, image_ceilings),
            quota: QuotaEnforcer::new(quota),
            approval,
            media: MediaIngestor::new(ports.storage.clone(), image_ceilings),
            commit: CommitCoordinator::new(ports.listings.clone(), ports.media.clone()),
            moderation: ModerationService::new(ports.clone()),
            locks: OwnerLocks::default(),
            environment,
            ports,
        }
    }

    pub fn moderation(&self) -> &ModerationService {
        &self.moderation
    }

    pub fn environment(&self) -> AppEnvironment {
        self.environment
    }

    pub fn authenticate(&self, credential: Option<&str>) -> Result<Principal, SubmissionError> {
        Ok(self.identity.resolve(credential)?)
    }

    /// Runs identity, delegation, normalization, quota, approval, media and commit in order.
    ///
    /// Nothing is written unless every check passes; a failed commit leaves no listing behind.
    pub fn submit(
        &self,
        request: SubmissionRequest,
    ) -> Result<SubmissionReceipt, SubmissionError> {
        let SubmissionRequest {
            credential,
            client_ip,
            payload,
        } = request;

        let principal = self.identity.resolve(credential.as_deref())?;
        let target = payload
            .target_user_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| AccountId(value.to_string()));
        let delegation = self.delegation.resolve(principal, target.as_ref())?;

        let canonical = self.normalizer.normalize(payload)?;
        for degraded in &canonical.degraded {
            warn!(
                owner_id = %delegation.owner_id(),
                field = degraded.field,
                reason = degraded.reason,
                "optional field degraded to null"
            );
        }

        let lock = self.locks.handle(delegation.owner_id());
        let owner_guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let quota = self.check_quota(&delegation)?;
        let status =
            self.approval
                .initial_status(delegation.owner_role(), self.environment, canonical.draft);

        let site_id = self
            .normalizer
            .tenants()
            .route(canonical.location.country_code.as_deref());
        let ingestion = self.media.ingest(
            &canonical.media,
            UploadScope {
                site: &site_id,
                owner: delegation.owner_id(),
            },
            canonical.category,
            canonical.draft,
        )?;

        let attempted = canonical.media.len();
        let primary_index = canonical.primary_image_index;
        let degraded_fields = canonical.degraded.clone();
        let listing = build_record(&delegation, canonical, site_id, status, client_ip);

        let plan = CommitPlan {
            listing,
            image_urls: ingestion.urls.clone(),
            primary_index,
        };
        let receipt = match self.commit.commit(plan) {
            Ok(receipt) => receipt,
            Err(err) => {
                self.media.discard(&ingestion.uploaded);
                return Err(err.into());
            }
        };
        drop(owner_guard);

        let listing = receipt.listing;
        info!(
            listing_id = %listing.id,
            owner_id = %listing.owner_id,
            site_id = %listing.site_id,
            status = %listing.status,
            delegated = delegation.delegated,
            "listing submitted"
        );
        self.notify_submitted(&delegation, &listing);

        Ok(SubmissionReceipt {
            message: receipt_message(listing.status),
            status: listing.status,
            media: MediaLinkSummary {
                attempted,
                linked: receipt.media.len(),
            },
            degraded_fields,
            delegated: delegation.delegated,
            owner_id: listing.owner_id.clone(),
            quota,
            listing_id: listing.id,
        })
    }

    /// Loads a listing for the caller. Listings outside the caller's site and
    /// half-committed rows (non-draft without media) read as not found.
    pub fn get(
        &self,
        principal: &Principal,
        listing_id: &ListingId,
    ) -> Result<ListingView, SubmissionError> {
        let not_found = || SubmissionError::ListingNotFound(listing_id.clone());

        let listing = self.ports.listings.fetch(listing_id)?.ok_or_else(not_found)?;

        let visible = listing.site_id == *principal.site()
            || listing.owner_id == *principal.id()
            || listing.created_by == *principal.id()
            || principal.capabilities.moderate_cross_site;
        if !visible {
            return Err(not_found());
        }

        let media = self.ports.media.for_listing(listing_id)?;
        if media.is_empty() && !listing.is_draft() {
            return Err(not_found());
        }

        Ok(ListingView { listing, media })
    }

    fn check_quota(&self, delegation: &DelegationContext) -> Result<QuotaCheck, SubmissionError> {
        if self.quota.exempts(delegation) {
            return Ok(self.quota.exempt_check(delegation));
        }

        let current = self
            .ports
            .listings
            .count_open_for_owner(delegation.owner_id())?;
        Ok(self.quota.check(delegation, current)?)
    }

    fn notify_submitted(&self, delegation: &DelegationContext, listing: &ListingRecord) {
        let template = match listing.status {
            ListingStatus::Active => "listing_published",
            ListingStatus::Pending => "listing_pending_review",
            _ => return,
        };

        let mut details = BTreeMap::new();
        details.insert("title".to_string(), listing.title.clone());
        details.insert("site_id".to_string(), listing.site_id.to_string());
        if delegation.delegated {
            details.insert("created_by".to_string(), delegation.author_id().to_string());
        }

        let notice = OwnerNotice {
            template: template.to_string(),
            listing_id: listing.id.clone(),
            recipient: Some(delegation.owner.email.clone()),
            details,
        };

        if let Err(err) = self.ports.notifier.notify(notice) {
            warn!(listing_id = %listing.id, error = %err, "submission notification failed");
        }
    }
}

fn receipt_message(status: ListingStatus) -> &'static str {
    match status {
        ListingStatus::Active => "Listing published",
        ListingStatus::Draft => "Draft saved",
        _ => "Listing submitted for review",
    }
}

fn build_record(
    delegation: &DelegationContext,
    canonical: CanonicalListing,
    site_id: SiteId,
    status: ListingStatus,
    client_ip: Option<IpAddr>,
) -> ListingRecord {
    let now = Utc::now();
    let attestation = if canonical.attested {
        Attestation {
            attested: true,
            attested_at: Some(now),
            attested_ip: client_ip,
        }
    } else {
        Attestation::default()
    };

    ListingRecord {
        id: next_listing_id(),
        owner_id: delegation.owner_id().clone(),
        created_by: delegation.author_id().clone(),
        site_id,
        category: canonical.category,
        property_type: canonical.property_type,
        title: canonical.title,
        description: canonical.description,
        price: canonical.price,
        price_period: canonical.price_period,
        structure: canonical.structure,
        location: canonical.location,
        amenities: canonical.amenities,
        contact: canonical.contact,
        video_url: canonical.video_url,
        status,
        rejection_reason: None,
        listed_by: delegation.owner_role().listed_by(),
        attestation,
        image_urls: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}
