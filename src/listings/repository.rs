use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::domain::{
    Account, AccountId, ListingId, ListingRecord, ListingStatus, MediaRecord, SiteId,
};

/// Listing row storage. Each call is one independently atomic statement.
pub trait ListingRepository: Send + Sync {
    fn insert(&self, record: ListingRecord) -> Result<ListingRecord, RepositoryError>;
    fn fetch(&self, id: &ListingId) -> Result<Option<ListingRecord>, RepositoryError>;
    fn delete(&self, id: &ListingId) -> Result<(), RepositoryError>;
    fn update_status(
        &self,
        id: &ListingId,
        status: ListingStatus,
        rejection_reason: Option<String>,
    ) -> Result<ListingRecord, RepositoryError>;
    fn set_image_urls(
        &self,
        id: &ListingId,
        urls: Vec<String>,
    ) -> Result<ListingRecord, RepositoryError>;
    /// Listings of the owner that still occupy a quota slot.
    fn count_open_for_owner(&self, owner: &AccountId) -> Result<u32, RepositoryError>;
    /// Pending listings, optionally restricted to one site.
    fn pending(
        &self,
        site: Option<&SiteId>,
        limit: usize,
    ) -> Result<Vec<ListingRecord>, RepositoryError>;
}

/// Media row storage, kept separate from listings as in the backing schema.
pub trait MediaRepository: Send + Sync {
    fn insert_batch(&self, rows: Vec<MediaRecord>) -> Result<Vec<MediaRecord>, RepositoryError>;
    fn for_listing(&self, listing_id: &ListingId) -> Result<Vec<MediaRecord>, RepositoryError>;
    fn delete_for_listing(&self, listing_id: &ListingId) -> Result<usize, RepositoryError>;
}

pub trait AccountRepository: Send + Sync {
    fn fetch(&self, id: &AccountId) -> Result<Option<Account>, RepositoryError>;
}

/// Resolves bearer credentials issued by the external auth provider.
pub trait SessionStore: Send + Sync {
    fn resolve(&self, credential: &str) -> Result<Option<AccountId>, RepositoryError>;
}

/// Object storage for listing images. `put` returns the public URL.
pub trait ObjectStorage: Send + Sync {
    fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, StorageError>;
    fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Outbound owner notifications (e-mail or push adapters).
pub trait OwnerNotifier: Send + Sync {
    fn notify(&self, notice: OwnerNotice) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerNotice {
    pub template: String,
    pub listing_id: ListingId,
    pub recipient: Option<String>,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage rejected object: {0}")]
    Rejected(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

/// Every collaborator the listing workflows depend on.
#[derive(Clone)]
pub struct ListingPorts {
    pub listings: Arc<dyn ListingRepository>,
    pub media: Arc<dyn MediaRepository>,
    pub accounts: Arc<dyn AccountRepository>,
    pub sessions: Arc<dyn SessionStore>,
    pub storage: Arc<dyn ObjectStorage>,
    pub notifier: Arc<dyn OwnerNotifier>,
}
