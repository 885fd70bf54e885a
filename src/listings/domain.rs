use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for stored listings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub String);

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier wrapper for marketplace accounts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lowercase tenant ("site") identifier, one per isolated market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(pub String);

impl SiteId {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// For-sale-by-owner seller.
    Owner,
    Landlord,
    /// Verified real-estate professional.
    Agent,
    CountryAdmin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Owner,
        Role::Landlord,
        Role::Agent,
        Role::CountryAdmin,
        Role::SuperAdmin,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Landlord => "landlord",
            Role::Agent => "agent",
            Role::CountryAdmin => "country_admin",
            Role::SuperAdmin => "super_admin",
        }
    }

    /// Public "listed by" label for listings this role owns.
    pub const fn listed_by(self) -> ListedBy {
        match self {
            Role::Owner => ListedBy::Owner,
            Role::Landlord => ListedBy::Landlord,
            Role::Agent => ListedBy::Agent,
            Role::CountryAdmin | Role::SuperAdmin => ListedBy::Marketplace,
        }
    }
}

/// Who a listing is shown as coming from. Staff-owned listings read as the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListedBy {
    Owner,
    Landlord,
    Agent,
    Marketplace,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Basic,
    Premium,
    Enterprise,
}

impl SubscriptionTier {
    pub const ALL: [SubscriptionTier; 4] = [
        SubscriptionTier::Free,
        SubscriptionTier::Basic,
        SubscriptionTier::Premium,
        SubscriptionTier::Enterprise,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            SubscriptionTier::Free => "free",
            SubscriptionTier::Basic => "basic",
            SubscriptionTier::Premium => "premium",
            SubscriptionTier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for SubscriptionTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Marketplace account as loaded from the account store. Read only for this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub role: Role,
    pub tier: SubscriptionTier,
    pub site_id: SiteId,
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub created_by_admin: Option<AccountId>,
}

/// Permissions derived once from the account role when the caller is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Capabilities {
    pub delegate: bool,
    pub delegate_cross_site: bool,
    pub moderate: bool,
    pub moderate_cross_site: bool,
    pub quota_exempt_for_self: bool,
}

impl Capabilities {
    pub const fn for_role(role: Role) -> Self {
        match role {
            Role::SuperAdmin => Self {
                delegate: true,
                delegate_cross_site: true,
                moderate: true,
                moderate_cross_site: true,
                quota_exempt_for_self: true,
            },
            Role::CountryAdmin => Self {
                delegate: true,
                delegate_cross_site: false,
                moderate: true,
                moderate_cross_site: false,
                quota_exempt_for_self: true,
            },
            Role::Owner | Role::Landlord | Role::Agent => Self {
                delegate: false,
                delegate_cross_site: false,
                moderate: false,
                moderate_cross_site: false,
                quota_exempt_for_self: false,
            },
        }
    }
}

/// Authenticated caller for the duration of one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub account: Account,
    pub capabilities: Capabilities,
}

impl Principal {
    pub fn from_account(account: Account) -> Self {
        let capabilities = Capabilities::for_role(account.role);
        Self {
            account,
            capabilities,
        }
    }

    pub fn id(&self) -> &AccountId {
        &self.account.id
    }

    pub fn site(&self) -> &SiteId {
        &self.account.site_id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingCategory {
    Sale,
    Rent,
    Lease,
    ShortTerm,
}

impl ListingCategory {
    pub const fn label(self) -> &'static str {
        match self {
            ListingCategory::Sale => "sale",
            ListingCategory::Rent => "rent",
            ListingCategory::Lease => "lease",
            ListingCategory::ShortTerm => "short_term",
        }
    }

    pub const fn is_rental(self) -> bool {
        !matches!(self, ListingCategory::Sale)
    }

    /// Accepts the spellings used by current and legacy clients.
    pub fn parse(raw: &str) -> Option<Self> {
        match normalized_token(raw).as_str() {
            "sale" | "for_sale" | "sell" | "buy" => Some(Self::Sale),
            "rent" | "rental" | "for_rent" => Some(Self::Rent),
            "lease" | "for_lease" => Some(Self::Lease),
            "short_term" | "shortterm" | "short_let" | "vacation" | "holiday" => {
                Some(Self::ShortTerm)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    House,
    Apartment,
    Condo,
    Townhouse,
    Land,
    Commercial,
    Other,
}

impl PropertyType {
    pub fn parse(raw: &str) -> Self {
        match normalized_token(raw).as_str() {
            "house" | "single_family" | "villa" | "detached" => Self::House,
            "apartment" | "flat" | "studio" => Self::Apartment,
            "condo" | "condominium" => Self::Condo,
            "townhouse" | "townhome" | "duplex" => Self::Townhouse,
            "land" | "lot" | "plot" | "land_parcel" | "vacant_land" | "farm_land" => Self::Land,
            "commercial" | "office" | "retail" | "warehouse" => Self::Commercial,
            _ => Self::Other,
        }
    }

    pub const fn is_land(self) -> bool {
        matches!(self, PropertyType::Land)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PricePeriod {
    Nightly,
    Weekly,
    Monthly,
    Yearly,
}

impl PricePeriod {
    pub fn parse(raw: &str) -> Option<Self> {
        match normalized_token(raw).as_str() {
            "night" | "nightly" | "per_night" | "daily" => Some(Self::Nightly),
            "week" | "weekly" | "per_week" => Some(Self::Weekly),
            "month" | "monthly" | "per_month" => Some(Self::Monthly),
            "year" | "yearly" | "annual" | "annually" | "per_year" => Some(Self::Yearly),
            _ => None,
        }
    }
}

/// Closed set of listing states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    Draft,
    Pending,
    Active,
    Rejected,
    Sold,
    UnderContract,
}

impl ListingStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ListingStatus::Draft => "draft",
            ListingStatus::Pending => "pending",
            ListingStatus::Active => "active",
            ListingStatus::Rejected => "rejected",
            ListingStatus::Sold => "sold",
            ListingStatus::UnderContract => "under_contract",
        }
    }

    /// Whether the listing occupies a slot in the owner's quota.
    pub const fn counts_toward_quota(self) -> bool {
        matches!(
            self,
            ListingStatus::Draft | ListingStatus::Pending | ListingStatus::Active
        )
    }

    pub fn can_transition_to(self, next: ListingStatus) -> bool {
        use ListingStatus::*;
        matches!(
            (self, next),
            (Draft, Pending)
                | (Draft, Active)
                | (Pending, Active)
                | (Pending, Rejected)
                | (Active, Rejected)
                | (Active, Sold)
                | (Active, UnderContract)
                | (Rejected, Active)
        )
    }
}

impl fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuralAttributes {
    pub bedrooms: Option<u16>,
    pub bathrooms: Option<f32>,
    pub size_sqft: Option<u32>,
    pub year_built: Option<u16>,
    pub lot_size: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub country_code: Option<String>,
    pub region: Option<String>,
    pub city: Option<String>,
    pub address: Option<String>,
    pub postal_code: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// Recorded affirmation of legal authority to list the property.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub attested: bool,
    pub attested_at: Option<DateTime<Utc>>,
    pub attested_ip: Option<IpAddr>,
}

/// Stored listing row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub id: ListingId,
    pub owner_id: AccountId,
    pub created_by: AccountId,
    pub site_id: SiteId,
    pub category: ListingCategory,
    pub property_type: PropertyType,
    pub title: String,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub price_period: Option<PricePeriod>,
    pub structure: StructuralAttributes,
    pub location: Location,
    pub amenities: BTreeSet<String>,
    pub contact: ContactDetails,
    pub video_url: Option<String>,
    pub status: ListingStatus,
    pub rejection_reason: Option<String>,
    pub listed_by: ListedBy,
    pub attestation: Attestation,
    pub image_urls: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListingRecord {
    pub fn is_draft(&self) -> bool {
        self.status == ListingStatus::Draft
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
}

/// One uploaded image bound to exactly one listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub listing_id: ListingId,
    pub url: String,
    pub is_primary: bool,
    pub display_order: u32,
    pub kind: MediaKind,
}

fn normalized_token(raw: &str) -> String {
    raw.trim()
        .to_ascii_lowercase()
        .chars()
        .map(|ch| if ch == '-' || ch == ' ' { '_' } else { ch })
        .collect()
}
