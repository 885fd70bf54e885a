use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use crate::config::{AppEnvironment, ListingPolicy};
use crate::listings::commit::media_rows;
use crate::listings::domain::{
    Account, AccountId, Attestation, ContactDetails, ListedBy, ListingCategory, ListingId,
    ListingRecord, ListingStatus, Location, MediaRecord, Principal, PropertyType, Role, SiteId,
    StructuralAttributes, SubscriptionTier,
};
use crate::listings::normalizer::RawSubmission;
use crate::listings::repository::{
    AccountRepository, ListingPorts, ListingRepository, MediaRepository, NotifyError,
    ObjectStorage, OwnerNotice, OwnerNotifier, RepositoryError, SessionStore, StorageError,
};
use crate::listings::service::{ListingSubmissionService, SubmissionRequest};
use crate::listings::listing_router;

pub(super) const OWNER_TOKEN: &str = "tok-owner";
pub(super) const OWNER_BASIC_TOKEN: &str = "tok-owner-basic";
pub(super) const LANDLORD_TOKEN: &str = "tok-landlord";
pub(super) const AGENT_TOKEN: &str = "tok-agent";
pub(super) const ADMIN_US_TOKEN: &str = "tok-admin-us";
pub(super) const ADMIN_UK_TOKEN: &str = "tok-admin-uk";
pub(super) const OWNER_UK_TOKEN: &str = "tok-owner-uk";
pub(super) const SUPER_TOKEN: &str = "tok-super";
pub(super) const GHOST_TOKEN: &str = "tok-ghost";

fn unavailable() -> RepositoryError {
    RepositoryError::Unavailable("injected failure".to_string())
}

#[derive(Default)]
pub(super) struct MemoryListings {
    records: Mutex<BTreeMap<ListingId, ListingRecord>>,
    pub(super) fail_insert: AtomicBool,
    pub(super) fail_delete: AtomicBool,
    pub(super) fail_publish: AtomicBool,
    pub(super) fail_reads: AtomicBool,
}

impl MemoryListings {
    pub(super) fn get(&self, id: &ListingId) -> Option<ListingRecord> {
        self.records.lock().expect("listing mutex poisoned").get(id).cloned()
    }

    pub(super) fn all(&self) -> Vec<ListingRecord> {
        self.records
            .lock()
            .expect("listing mutex poisoned")
            .values()
            .cloned()
            .collect()
    }

    pub(super) fn len(&self) -> usize {
        self.records.lock().expect("listing mutex poisoned").len()
    }

    pub(super) fn seed(&self, record: ListingRecord) {
        self.records
            .lock()
            .expect("listing mutex poisoned")
            .insert(record.id.clone(), record);
    }
}

impl ListingRepository for MemoryListings {
    fn insert(&self, record: ListingRecord) -> Result<ListingRecord, RepositoryError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut guard = self.records.lock().expect("listing mutex poisoned");
        if guard.contains_key(&record.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(record.id.clone(), record.clone());
        Ok(record)
    }

    fn fetch(&self, id: &ListingId) -> Result<Option<ListingRecord>, RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self.get(id))
    }

    fn delete(&self, id: &ListingId) -> Result<(), RepositoryError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.records
            .lock()
            .expect("listing mutex poisoned")
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    fn update_status(
        &self,
        id: &ListingId,
        status: ListingStatus,
        rejection_reason: Option<String>,
    ) -> Result<ListingRecord, RepositoryError> {
        let mut guard = self.records.lock().expect("listing mutex poisoned");
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
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut guard = self.records.lock().expect("listing mutex poisoned");
        let record = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        record.image_urls = urls;
        Ok(record.clone())
    }

    fn count_open_for_owner(&self, owner: &AccountId) -> Result<u32, RepositoryError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let guard = self.records.lock().expect("listing mutex poisoned");
        Ok(guard
            .values()
            .filter(|record| record.owner_id == *owner && record.status.counts_toward_quota())
            .count() as u32)
    }

    fn pending(
        &self,
        site: Option<&SiteId>,
        limit: usize,
    ) -> Result<Vec<ListingRecord>, RepositoryError> {
        let guard = self.records.lock().expect("listing mutex poisoned");
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

#[derive(Default)]
pub(super) struct MemoryMedia {
    rows: Mutex<Vec<MediaRecord>>,
    pub(super) fail_insert: AtomicBool,
    pub(super) fail_delete: AtomicBool,
}

impl MemoryMedia {
    pub(super) fn rows_for(&self, listing_id: &ListingId) -> Vec<MediaRecord> {
        self.rows
            .lock()
            .expect("media mutex poisoned")
            .iter()
            .filter(|row| row.listing_id == *listing_id)
            .cloned()
            .collect()
    }

    pub(super) fn len(&self) -> usize {
        self.rows.lock().expect("media mutex poisoned").len()
    }
}

impl MediaRepository for MemoryMedia {
    fn insert_batch(&self, rows: Vec<MediaRecord>) -> Result<Vec<MediaRecord>, RepositoryError> {
        if self.fail_insert.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        self.rows
            .lock()
            .expect("media mutex poisoned")
            .extend(rows.iter().cloned());
        Ok(rows)
    }

    fn for_listing(&self, listing_id: &ListingId) -> Result<Vec<MediaRecord>, RepositoryError> {
        Ok(self.rows_for(listing_id))
    }

    fn delete_for_listing(&self, listing_id: &ListingId) -> Result<usize, RepositoryError> {
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        let mut guard = self.rows.lock().expect("media mutex poisoned");
        let before = guard.len();
        guard.retain(|row| row.listing_id != *listing_id);
        Ok(before - guard.len())
    }
}

#[derive(Default)]
pub(super) struct MemoryAccounts {
    accounts: Mutex<HashMap<AccountId, Account>>,
    pub(super) unavailable: AtomicBool,
}

impl MemoryAccounts {
    pub(super) fn insert(&self, account: Account) {
        self.accounts
            .lock()
            .expect("account mutex poisoned")
            .insert(account.id.clone(), account);
    }

    pub(super) fn get(&self, id: &str) -> Account {
        self.accounts
            .lock()
            .expect("account mutex poisoned")
            .get(&AccountId(id.to_string()))
            .cloned()
            .expect("fixture account exists")
    }
}

impl AccountRepository for MemoryAccounts {
    fn fetch(&self, id: &AccountId) -> Result<Option<Account>, RepositoryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(unavailable());
        }
        Ok(self
            .accounts
            .lock()
            .expect("account mutex poisoned")
            .get(id)
            .cloned())
    }
}

#[derive(Default)]
pub(super) struct MemorySessions {
    sessions: Mutex<HashMap<String, AccountId>>,
}

impl MemorySessions {
    pub(super) fn grant(&self, token: &str, account: &str) {
        self.sessions
            .lock()
            .expect("session mutex poisoned")
            .insert(token.to_string(), AccountId(account.to_string()));
    }
}

impl SessionStore for MemorySessions {
    fn resolve(&self, credential: &str) -> Result<Option<AccountId>, RepositoryError> {
        Ok(self
            .sessions
            .lock()
            .expect("session mutex poisoned")
            .get(credential)
            .cloned())
    }
}

#[derive(Default)]
pub(super) struct MemoryStorage {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    deleted: Mutex<Vec<String>>,
    puts: AtomicUsize,
    /// Zero-based index of the `put` call that fails.
    fail_on_put: Mutex<Option<usize>>,
}

impl MemoryStorage {
    pub(super) fn fail_on_put(&self, index: usize) {
        *self.fail_on_put.lock().expect("storage mutex poisoned") = Some(index);
    }

    pub(super) fn keys(&self) -> Vec<String> {
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .keys()
            .cloned()
            .collect()
    }

    pub(super) fn deleted(&self) -> Vec<String> {
        self.deleted.lock().expect("storage mutex poisoned").clone()
    }
}

impl ObjectStorage for MemoryStorage {
    fn put(&self, key: &str, _content_type: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let call = self.puts.fetch_add(1, Ordering::SeqCst);
        if *self.fail_on_put.lock().expect("storage mutex poisoned") == Some(call) {
            return Err(StorageError::Unavailable("bucket offline".to_string()));
        }
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .insert(key.to_string(), bytes);
        Ok(format!("https://cdn.example.test/{key}"))
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.objects
            .lock()
            .expect("storage mutex poisoned")
            .remove(key);
        self.deleted
            .lock()
            .expect("storage mutex poisoned")
            .push(key.to_string());
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryNotifier {
    events: Mutex<Vec<OwnerNotice>>,
    attempts: AtomicUsize,
    pub(super) fail: AtomicBool,
}

impl MemoryNotifier {
    pub(super) fn events(&self) -> Vec<OwnerNotice> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }

    pub(super) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl OwnerNotifier for MemoryNotifier {
    fn notify(&self, notice: OwnerNotice) -> Result<(), NotifyError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotifyError::Transport("smtp relay down".to_string()));
        }
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notice);
        Ok(())
    }
}

pub(super) fn account(id: &str, role: Role, tier: SubscriptionTier, site: &str) -> Account {
    Account {
        id: AccountId(id.to_string()),
        role,
        tier,
        site_id: SiteId::new(site),
        email: format!("{id}@example.com"),
        display_name: None,
        created_by_admin: None,
    }
}

pub(super) struct Harness {
    pub(super) service: Arc<ListingSubmissionService>,
    pub(super) listings: Arc<MemoryListings>,
    pub(super) media: Arc<MemoryMedia>,
    pub(super) accounts: Arc<MemoryAccounts>,
    pub(super) sessions: Arc<MemorySessions>,
    pub(super) storage: Arc<MemoryStorage>,
    pub(super) notifier: Arc<MemoryNotifier>,
}

impl Harness {
    pub(super) fn router(&self) -> axum::Router {
        listing_router(self.service.clone())
    }

    pub(super) fn principal(&self, id: &str) -> Principal {
        Principal::from_account(self.accounts.get(id))
    }
}

pub(super) fn harness() -> Harness {
    harness_with(ListingPolicy::default(), AppEnvironment::Production)
}

pub(super) fn harness_with(policy: ListingPolicy, environment: AppEnvironment) -> Harness {
    let accounts = Arc::new(MemoryAccounts::default());
    let sessions = Arc::new(MemorySessions::default());

    let fixtures = [
        (OWNER_TOKEN, account("owner-1", Role::Owner, SubscriptionTier::Free, "us")),
        (
            OWNER_BASIC_TOKEN,
            account("owner-2", Role::Owner, SubscriptionTier::Basic, "us"),
        ),
        (
            LANDLORD_TOKEN,
            account("landlord-1", Role::Landlord, SubscriptionTier::Free, "us"),
        ),
        (AGENT_TOKEN, account("agent-1", Role::Agent, SubscriptionTier::Free, "us")),
        (
            ADMIN_US_TOKEN,
            account("admin-us", Role::CountryAdmin, SubscriptionTier::Free, "us"),
        ),
        (
            ADMIN_UK_TOKEN,
            account("admin-uk", Role::CountryAdmin, SubscriptionTier::Free, "uk"),
        ),
        (
            OWNER_UK_TOKEN,
            account("owner-uk", Role::Owner, SubscriptionTier::Free, "uk"),
        ),
        (
            SUPER_TOKEN,
            account("super-1", Role::SuperAdmin, SubscriptionTier::Enterprise, "global"),
        ),
    ];
    for (token, account) in fixtures {
        sessions.grant(token, &account.id.0);
        accounts.insert(account);
    }
    sessions.grant(GHOST_TOKEN, "ghost");

    let listings = Arc::new(MemoryListings::default());
    let media = Arc::new(MemoryMedia::default());
    let storage = Arc::new(MemoryStorage::default());
    let notifier = Arc::new(MemoryNotifier::default());

    let ports = ListingPorts {
        listings: listings.clone(),
        media: media.clone(),
        accounts: accounts.clone(),
        sessions: sessions.clone(),
        storage: storage.clone(),
        notifier: notifier.clone(),
    };
    let service = Arc::new(ListingSubmissionService::new(ports, policy, environment));

    Harness {
        service,
        listings,
        media,
        accounts,
        sessions,
        storage,
        notifier,
    }
}

pub(super) fn payload(value: Value) -> RawSubmission {
    serde_json::from_value(value).expect("fixture payload deserializes")
}

pub(super) fn sale_payload() -> RawSubmission {
    payload(json!({
        "listing_type": "sale",
        "property_type": "house",
        "title": "Three bedroom craftsman",
        "description": "Walkable to downtown.",
        "price": 350000,
        "bedrooms": 3,
        "bathrooms": 2,
        "country": "US",
        "city": "Austin",
        "amenities": ["garage", "garden"],
        "contact_email": "Seller@Example.com",
        "ownership_attested": true,
        "image_urls": [
            "https://images.example.com/a.jpg",
            "https://images.example.com/b.jpg"
        ]
    }))
}

pub(super) fn rental_payload() -> RawSubmission {
    payload(json!({
        "category": "rent",
        "propertyType": "apartment",
        "title": "Sunny one bedroom",
        "price": "1,800",
        "price_period": "monthly",
        "countryCode": "us",
        "city": "Denver",
        "attestation": "true",
        "imageUrls": ["https://images.example.com/rental.jpg"]
    }))
}

pub(super) fn draft_payload() -> RawSubmission {
    payload(json!({
        "title": "Half finished listing",
        "is_draft": true
    }))
}

pub(super) fn request(token: &str, payload: RawSubmission) -> SubmissionRequest {
    SubmissionRequest {
        credential: Some(token.to_string()),
        client_ip: "198.51.100.4".parse().ok(),
        payload,
    }
}

pub(super) fn listing_record(
    id: &str,
    owner: &str,
    site: &str,
    status: ListingStatus,
) -> ListingRecord {
    let now = Utc::now();
    ListingRecord {
        id: ListingId(id.to_string()),
        owner_id: AccountId(owner.to_string()),
        created_by: AccountId(owner.to_string()),
        site_id: SiteId::new(site),
        category: ListingCategory::Sale,
        property_type: PropertyType::House,
        title: format!("Seeded {id}"),
        description: None,
        price: Some(250_000.0),
        price_period: None,
        structure: StructuralAttributes::default(),
        location: Location {
            country_code: Some(site.to_ascii_uppercase()),
            city: Some("Seed City".to_string()),
            ..Location::default()
        },
        amenities: BTreeSet::new(),
        contact: ContactDetails::default(),
        video_url: None,
        status,
        rejection_reason: None,
        listed_by: ListedBy::Owner,
        attestation: Attestation::default(),
        image_urls: Vec::new(),
        created_at: now,
        updated_at: now,
    }
}

/// Stored listing with optional media, bypassing the submission pipeline.
pub(super) fn seed_listing(
    harness: &Harness,
    id: &str,
    owner: &str,
    site: &str,
    status: ListingStatus,
    images: usize,
) -> ListingId {
    let urls: Vec<String> = (0..images)
        .map(|index| format!("https://images.example.com/{id}-{index}.jpg"))
        .collect();
    let created_at =
        Utc::now() - Duration::hours(1) + Duration::seconds(harness.listings.len() as i64);

    let mut record = listing_record(id, owner, site, status);
    record.image_urls = urls.clone();
    record.created_at = created_at;
    record.updated_at = created_at;
    let listing_id = record.id.clone();
    harness.listings.seed(record);

    if images > 0 {
        harness
            .media
            .insert_batch(media_rows(&listing_id, &urls, 0))
            .expect("seed media");
    }

    listing_id
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
