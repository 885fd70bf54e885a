use chrono::Utc;
use listing_intake::error::AppError;
use listing_intake::listings::{
    Account, AccountId, AccountRepository, ListingId, ListingPorts, ListingRecord,
    ListingRepository, ListingStatus, MediaRecord, MediaRepository, NotifyError, ObjectStorage,
    OwnerNotice, OwnerNotifier, RepositoryError, Role, SessionStore, SiteId, StorageError,
    SubscriptionTier,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

fn poisoned<T>(_: PoisonError<T>) -> RepositoryError {
    RepositoryError::Unavailable("in-memory store lock poisoned".to_string())
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryListingRepository {
    records: Arc<Mutex<HashMap<ListingId, ListingRecord>>>,
}

impl ListingRepository for InMemoryListingRepository {
    fn insert(&self, record: ListingRecord) -> Result<ListingRecord, RepositoryError> {
        let mut guard = self.records.lock().map_err(poisoned)?;
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ListingId) -> Result<Option<ListingRecord>, RepositoryError> {
        let guard = self.records.lock().map_err(poisoned)?;
        Ok(guard.get(id).cloned())
    }

    fn delete(&self, id: &ListingId) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().map_err(poisoned)?;
        guard.remove(id).map(|_| ()).ok_or(RepositoryError::NotFound)
    }

    fn update_status(
        &self,
        id: &ListingId,
        status: ListingStatus,
        rejection_reason: Option<String>,
    ) -> Result<ListingRecord, RepositoryError> {
        let mut guard = self.records.lock().map_err(poisoned)?;
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record.status = status;
        if rejection_reason.is_some() {
            record.rejection_reason = rejection_reason;
        }
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    fn set_image_urls(
        &self,
        id: &ListingId,
        urls: Vec<String>,
    ) -> Result<ListingRecord, RepositoryError> {
        let mut guard = self.records.lock().map_err(poisoned)?;
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record.image_urls = urls;
        Ok(record.clone())
    }

    fn count_open_for_owner(&self, owner: &AccountId) -> Result<u32, RepositoryError> {
        let guard = self.records.lock().map_err(poisoned)?;
        let open = guard
            .values()
            .filter(|record| record.owner_id == *owner && record.status.counts_toward_quota())
            .count();
        Ok(u32::try_from(open).unwrap_or(u32::MAX))
    }

    fn pending(
        &self,
        site: Option<&SiteId>,
        limit: usize,
    ) -> Result<Vec<ListingRecord>, RepositoryError> {
        let guard = self.records.lock().map_err(poisoned)?;
        let mut pending: Vec<ListingRecord> = guard
            .values()
            .filter(|record| record.status == ListingStatus::Pending)
            .filter(|record| site.map_or(true, |site| record.site_id == *site))
            .cloned()
            .collect();
        pending.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        pending.truncate(limit);
        Ok(pending)
    }
}

#[derive(Default, Clone)]
pub(crate) struct InMemoryMediaRepository {
    rows: Arc<Mutex<Vec<MediaRecord>>>,
}

impl MediaRepository for InMemoryMediaRepository {
    fn insert_batch(&self, rows: Vec<MediaRecord>) -> Result<Vec<MediaRecord>, RepositoryError> {
        let mut guard = self.rows.lock().map_err(poisoned)?;
        guard.extend(rows.iter().cloned());
        Ok(rows)
    }

    fn for_listing(&self, listing_id: &ListingId) -> Result<Vec<MediaRecord>, RepositoryError> {
        let guard = self.rows.lock().map_err(poisoned)?;
        Ok(guard
            .iter()
            .filter(|row| row.listing_id == *listing_id)
            .cloned()
            .collect())
    }

    fn delete_for_listing(&self, listing_id: &ListingId) -> Result<usize, RepositoryError> {
        let mut guard = self.rows.lock().map_err(poisoned)?;
        let before = guard.len();
        guard.retain(|row| row.listing_id != *listing_id);
        Ok(before - guard.len())
    }
}

/// Accounts and the bearer tokens that resolve to them.
#[derive(Default, Clone)]
pub(crate) struct InMemoryAccountDirectory {
    accounts: Arc<Mutex<HashMap<AccountId, Account>>>,
    sessions: Arc<Mutex<HashMap<String, AccountId>>>,
}

impl InMemoryAccountDirectory {
    pub(crate) fn register(&self, seed: SeedAccount) -> Result<(), RepositoryError> {
        let SeedAccount { token, account } = seed;
        self.sessions
            .lock()
            .map_err(poisoned)?
            .insert(token, account.id.clone());
        self.accounts
            .lock()
            .map_err(poisoned)?
            .insert(account.id.clone(), account);
        Ok(())
    }
}

impl AccountRepository for InMemoryAccountDirectory {
    fn fetch(&self, id: &AccountId) -> Result<Option<Account>, RepositoryError> {
        let guard = self.accounts.lock().map_err(poisoned)?;
        Ok(guard.get(id).cloned())
    }
}

impl SessionStore for InMemoryAccountDirectory {
    fn resolve(&self, credential: &str) -> Result<Option<AccountId>, RepositoryError> {
        let guard = self.sessions.lock().map_err(poisoned)?;
        Ok(guard.get(credential).cloned())
    }
}

/// Keeps uploaded images in memory and hands out `memory://` URLs.
#[derive(Default, Clone)]
pub(crate) struct InMemoryObjectStorage {
    objects: Arc<Mutex<BTreeMap<String, Vec<u8>>>>,
}

impl ObjectStorage for InMemoryObjectStorage {
    fn put(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        if bytes.is_empty() {
            return Err(StorageError::Rejected(format!("empty {content_type} object")));
        }
        self.objects
            .lock()
            .map_err(|_| StorageError::Unavailable("object store lock poisoned".to_string()))?
            .insert(key.to_string(), bytes);
        Ok(format!("memory://listing-media/{key}"))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .map_err(|_| StorageError::Unavailable("object store lock poisoned".to_string()))?
            .remove(key);
        Ok(())
    }
}

/// Writes owner notices to the log instead of an e-mail relay.
#[derive(Default, Clone)]
pub(crate) struct LoggingNotifier;

impl OwnerNotifier for LoggingNotifier {
    fn notify(&self, notice: OwnerNotice) -> Result<(), NotifyError> {
        info!(
            template = %notice.template,
            listing_id = %notice.listing_id,
            recipient = notice.recipient.as_deref().unwrap_or("unknown"),
            "owner notification"
        );
        Ok(())
    }
}

/// One account entry of the seed file, with the token that signs in as it.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SeedAccount {
    pub(crate) token: String,
    #[serde(flatten)]
    pub(crate) account: Account,
}

pub(crate) fn load_seed_accounts(path: Option<&Path>) -> Result<Vec<SeedAccount>, AppError> {
    match path {
        Some(path) => {
            let raw = fs::read_to_string(path)?;
            Ok(serde_json::from_str(&raw)?)
        }
        None => Ok(demo_accounts()),
    }
}

fn demo_accounts() -> Vec<SeedAccount> {
    let seed = |token: &str, id: &str, role, tier, site: &str| SeedAccount {
        token: token.to_string(),
        account: Account {
            id: AccountId(id.to_string()),
            role,
            tier,
            site_id: SiteId::new(site),
            email: format!("{id}@listings.local"),
            display_name: None,
            created_by_admin: None,
        },
    };

    vec![
        seed("demo-owner", "demo-owner", Role::Owner, SubscriptionTier::Free, "us"),
        seed("demo-agent", "demo-agent", Role::Agent, SubscriptionTier::Basic, "us"),
        seed(
            "demo-admin-us",
            "demo-admin-us",
            Role::CountryAdmin,
            SubscriptionTier::Free,
            "us",
        ),
        seed(
            "demo-super",
            "demo-super",
            Role::SuperAdmin,
            SubscriptionTier::Enterprise,
            "global",
        ),
    ]
}

/// In-memory adapters for every listing port, seeded with `accounts`.
pub(crate) fn in_memory_ports(accounts: Vec<SeedAccount>) -> Result<ListingPorts, RepositoryError> {
    let directory = Arc::new(InMemoryAccountDirectory::default());
    for account in accounts {
        directory.register(account)?;
    }

    Ok(ListingPorts {
        listings: Arc::new(InMemoryListingRepository::default()),
        media: Arc::new(InMemoryMediaRepository::default()),
        accounts: directory.clone(),
        sessions: directory,
        storage: Arc::new(InMemoryObjectStorage::default()),
        notifier: Arc::new(LoggingNotifier),
    })
}
