use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Deserialize;

use super::{AppEnvironment, ConfigError};
use crate::listings::approval::{ApprovalPolicy, ApprovalRule};
use crate::listings::domain::Role;
use crate::listings::media::ImageCeilings;
use crate::listings::quota::{MaxListings, QuotaEntry, QuotaTable};
use crate::listings::tenant::TenantRouter;

/// Business rules of the listing pipeline that operators may tune.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingPolicy {
    pub quota: QuotaTable,
    pub approval: ApprovalPolicy,
    pub tenants: TenantRouter,
    pub image_ceilings: ImageCeilings,
}

/// Partial policy read from `LISTING_POLICY_PATH`. Absent keys keep the defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyOverrides {
    #[serde(default)]
    pub quota: Vec<QuotaEntry>,
    pub default_max_listings: Option<MaxListings>,
    #[serde(default)]
    pub approval: BTreeMap<Role, ApprovalRule>,
    pub restricted_environments: Option<Vec<AppEnvironment>>,
    #[serde(default)]
    pub tenants: BTreeMap<String, String>,
    pub default_site: Option<String>,
    pub image_ceilings: Option<ImageCeilings>,
}

impl ListingPolicy {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::PolicyFile {
            path: path.to_path_buf(),
            source,
        })?;
        let overrides: PolicyOverrides =
            serde_json::from_str(&raw).map_err(|source| ConfigError::PolicyFormat {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::default().apply(overrides))
    }

    pub fn apply(self, overrides: PolicyOverrides) -> Self {
        let mut quota = self.quota.merge(overrides.quota);
        if let Some(default_max) = overrides.default_max_listings {
            quota = quota.with_default_max(default_max);
        }

        let mut approval = self.approval.merge(overrides.approval);
        if let Some(environments) = overrides.restricted_environments {
            approval = approval.with_restricted_environments(environments);
        }

        let mut tenants = self.tenants.extend(overrides.tenants);
        if let Some(default_site) = overrides.default_site.as_deref() {
            tenants = tenants.with_default_site(default_site);
        }

        Self {
            quota,
            approval,
            tenants,
            image_ceilings: overrides.image_ceilings.unwrap_or(self.image_ceilings),
        }
    }
}
