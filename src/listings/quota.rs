use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use super::delegation::DelegationContext;
use super::domain::{AccountId, Role, SubscriptionTier};

const UNLIMITED_SENTINEL: i64 = -1;
const LOCK_TABLE_PRUNE_THRESHOLD: usize = 1024;

/// Concurrent listing allowance. Configuration files write `-1` for unlimited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum MaxListings {
    Limited(u32),
    Unlimited,
}

impl MaxListings {
    pub fn permits(self, current: u32) -> bool {
        match self {
            MaxListings::Limited(max) => current < max,
            MaxListings::Unlimited => true,
        }
    }
}

impl TryFrom<i64> for MaxListings {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if value == UNLIMITED_SENTINEL {
            return Ok(Self::Unlimited);
        }
        u32::try_from(value)
            .map(Self::Limited)
            .map_err(|_| format!("max listings must be -1 (unlimited) or 0..={}", u32::MAX))
    }
}

impl From<MaxListings> for i64 {
    fn from(value: MaxListings) -> Self {
        match value {
            MaxListings::Limited(max) => i64::from(max),
            MaxListings::Unlimited => UNLIMITED_SENTINEL,
        }
    }
}

impl fmt::Display for MaxListings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaxListings::Limited(max) => write!(f, "{max}"),
            MaxListings::Unlimited => f.write_str("unlimited"),
        }
    }
}

/// One row of the role/tier quota table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaEntry {
    pub role: Role,
    pub tier: SubscriptionTier,
    pub max: MaxListings,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaTable {
    limits: BTreeMap<(Role, SubscriptionTier), MaxListings>,
    default_max: MaxListings,
}

impl QuotaTable {
    pub fn new(entries: impl IntoIterator<Item = QuotaEntry>, default_max: MaxListings) -> Self {
        let limits = entries
            .into_iter()
            .map(|entry| ((entry.role, entry.tier), entry.max))
            .collect();
        Self {
            limits,
            default_max,
        }
    }

    pub fn standard() -> Self {
        use MaxListings::{Limited, Unlimited};
        use SubscriptionTier::{Basic, Enterprise, Free, Premium};

        let rows = [
            (Role::Owner, [Limited(1), Limited(3), Limited(10), Limited(25)]),
            (Role::Landlord, [Limited(2), Limited(5), Limited(20), Limited(50)]),
            (Role::Agent, [Limited(5), Limited(25), Limited(100), Unlimited]),
            (Role::CountryAdmin, [Unlimited; 4]),
            (Role::SuperAdmin, [Unlimited; 4]),
        ];

        let entries = rows.into_iter().flat_map(|(role, limits)| {
            [Free, Basic, Premium, Enterprise]
                .into_iter()
                .zip(limits)
                .map(move |(tier, max)| QuotaEntry { role, tier, max })
        });

        Self::new(entries, Limited(1))
    }

    pub fn max_for(&self, role: Role, tier: SubscriptionTier) -> MaxListings {
        self.limits
            .get(&(role, tier))
            .copied()
            .unwrap_or(self.default_max)
    }

    pub fn default_max(&self) -> MaxListings {
        self.default_max
    }

    /// Adds or replaces rows.
    pub fn merge(mut self, entries: impl IntoIterator<Item = QuotaEntry>) -> Self {
        for entry in entries {
            self.limits.insert((entry.role, entry.tier), entry.max);
        }
        self
    }

    pub fn with_default_max(mut self, default_max: MaxListings) -> Self {
        self.default_max = default_max;
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = QuotaEntry> + '_ {
        self.limits
            .iter()
            .map(|(&(role, tier), &max)| QuotaEntry { role, tier, max })
    }
}

impl Default for QuotaTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("listing quota reached for {tier} tier ({current} of {max} listings in use)")]
pub struct QuotaExceeded {
    pub current: u32,
    pub max: u32,
    pub tier: SubscriptionTier,
}

/// Numbers behind a passed quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaCheck {
    pub current: Option<u32>,
    pub max: MaxListings,
    pub tier: SubscriptionTier,
    pub exempt: bool,
}

#[derive(Debug, Clone, Default)]
pub struct QuotaEnforcer {
    table: QuotaTable,
}

impl QuotaEnforcer {
    pub fn new(table: QuotaTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &QuotaTable {
        &self.table
    }

    /// Administrators listing for themselves skip the count entirely.
    pub fn exempts(&self, delegation: &DelegationContext) -> bool {
        !delegation.delegated && delegation.acting.capabilities.quota_exempt_for_self
    }

    pub fn exempt_check(&self, delegation: &DelegationContext) -> QuotaCheck {
        QuotaCheck {
            current: None,
            max: MaxListings::Unlimited,
            tier: delegation.owner_tier(),
            exempt: true,
        }
    }

    /// Compares the owner's open listing count with the role/tier allowance.
    pub fn check(
        &self,
        delegation: &DelegationContext,
        current: u32,
    ) -> Result<QuotaCheck, QuotaExceeded> {
        let tier = delegation.owner_tier();
        let max = self.table.max_for(delegation.owner_role(), tier);

        match max {
            MaxListings::Limited(limit) if !max.permits(current) => Err(QuotaExceeded {
                current,
                max: limit,
                tier,
            }),
            _ => Ok(QuotaCheck {
                current: Some(current),
                max,
                tier,
                exempt: false,
            }),
        }
    }
}

/// Advisory per-owner locks serializing count-then-insert within this process.
#[derive(Debug, Default)]
pub struct OwnerLocks {
    locks: Mutex<HashMap<AccountId, Arc<Mutex<()>>>>,
}

impl OwnerLocks {
    pub fn handle(&self, owner: &AccountId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.len() > LOCK_TABLE_PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        locks
            .entry(owner.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
