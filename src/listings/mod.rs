//! Listing submission and moderation pipeline.
//!
//! A submission flows through identity and delegation resolution, payload
//! normalization, quota enforcement, the auto-approval policy, media ingestion
//! and a compensating commit. Storage, sessions, object storage and owner
//! notifications are reached through the traits in [`repository`].

pub mod approval;
pub mod commit;
pub mod delegation;
pub mod domain;
pub mod error;
pub mod identity;
pub mod media;
pub mod moderation;
pub mod normalizer;
pub mod quota;
pub mod repository;
pub mod router;
pub mod sanitize;
pub mod service;
pub mod tenant;

#[cfg(test)]
mod tests;

pub use approval::{ApprovalPolicy, ApprovalRule};
pub use commit::{CommitCoordinator, CommitError, CommitPlan, CommitReceipt, CommitStep};
pub use delegation::{DelegationContext, DelegationError, DelegationValidator};
pub use domain::{
    Account, AccountId, Attestation, Capabilities, ContactDetails, ListedBy, ListingCategory,
    ListingId, ListingRecord, ListingStatus, Location, MediaKind, MediaRecord, PricePeriod,
    Principal, PropertyType, Role, SiteId, StructuralAttributes, SubscriptionTier,
};
pub use error::SubmissionError;
pub use identity::{IdentityError, IdentityResolver};
pub use media::{ImageCeilings, MediaError, MediaIngestor, MediaSource};
pub use moderation::{ModerationError, ModerationOutcome, ModerationService};
pub use normalizer::{CanonicalListing, ListingNormalizer, RawSubmission, ValidationError};
pub use quota::{MaxListings, OwnerLocks, QuotaEnforcer, QuotaEntry, QuotaExceeded, QuotaTable};
pub use repository::{
    AccountRepository, ListingPorts, ListingRepository, MediaRepository, NotifyError,
    ObjectStorage, OwnerNotice, OwnerNotifier, RepositoryError, SessionStore, StorageError,
};
pub use router::listing_router;
pub use sanitize::DegradedToNull;
pub use service::{
    ListingSubmissionService, ListingView, MediaLinkSummary, SubmissionReceipt, SubmissionRequest,
};
pub use tenant::TenantRouter;
