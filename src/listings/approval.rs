use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{ListingStatus, Role};
use crate::config::AppEnvironment;

/// How a role's fresh submissions enter the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalRule {
    Publish,
    /// Publish, except in restricted environments where review applies.
    PublishOutsideRestricted,
    Review,
}

/// Role-keyed decision table for the initial listing status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApprovalPolicy {
    rules: BTreeMap<Role, ApprovalRule>,
    restricted_environments: Vec<AppEnvironment>,
}

impl ApprovalPolicy {
    pub fn new(
        rules: impl IntoIterator<Item = (Role, ApprovalRule)>,
        restricted_environments: Vec<AppEnvironment>,
    ) -> Self {
        Self {
            rules: rules.into_iter().collect(),
            restricted_environments,
        }
    }

    pub fn standard() -> Self {
        Self::new(
            [
                (Role::Owner, ApprovalRule::Review),
                (Role::Landlord, ApprovalRule::Review),
                (Role::Agent, ApprovalRule::Publish),
                (Role::CountryAdmin, ApprovalRule::Review),
                (Role::SuperAdmin, ApprovalRule::PublishOutsideRestricted),
            ],
            vec![AppEnvironment::Production],
        )
    }

    pub fn rule_for(&self, role: Role) -> ApprovalRule {
        self.rules.get(&role).copied().unwrap_or(ApprovalRule::Review)
    }

    pub fn is_restricted(&self, environment: AppEnvironment) -> bool {
        self.restricted_environments.contains(&environment)
    }

    /// Initial status for a listing owned by `owner_role`. Draft intent always wins.
    pub fn initial_status(
        &self,
        owner_role: Role,
        environment: AppEnvironment,
        draft: bool,
    ) -> ListingStatus {
        if draft {
            return ListingStatus::Draft;
        }

        match self.rule_for(owner_role) {
            ApprovalRule::Publish => ListingStatus::Active,
            ApprovalRule::PublishOutsideRestricted if !self.is_restricted(environment) => {
                ListingStatus::Active
            }
            ApprovalRule::PublishOutsideRestricted | ApprovalRule::Review => ListingStatus::Pending,
        }
    }

    pub fn merge(mut self, rules: impl IntoIterator<Item = (Role, ApprovalRule)>) -> Self {
        self.rules.extend(rules);
        self
    }

    pub fn with_restricted_environments(mut self, environments: Vec<AppEnvironment>) -> Self {
        self.restricted_environments = environments;
        self
    }

    pub fn rules(&self) -> impl Iterator<Item = (Role, ApprovalRule)> + '_ {
        self.rules.iter().map(|(&role, &rule)| (role, rule))
    }

    pub fn restricted_environments(&self) -> &[AppEnvironment] {
        &self.restricted_environments
    }
}

impl Default for ApprovalPolicy {
    fn default() -> Self {
        Self::standard()
    }
}
