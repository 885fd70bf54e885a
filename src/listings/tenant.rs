use std::collections::BTreeMap;

use super::domain::SiteId;

const DEFAULT_SITE: &str = "global";

const STANDARD_SITES: &[(&str, &str)] = &[
    ("US", "us"),
    ("CA", "ca"),
    ("MX", "mx"),
    ("GB", "uk"),
    ("UK", "uk"),
    ("IE", "ie"),
    ("AE", "uae"),
    ("SA", "ksa"),
    ("NG", "ng"),
    ("GH", "gh"),
    ("KE", "ke"),
    ("ZA", "za"),
    ("IN", "in"),
    ("AU", "au"),
];

/// Maps a country code onto the isolated site that owns its data.
///
/// Routing is total: unknown or missing codes land on the default site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRouter {
    sites: BTreeMap<String, SiteId>,
    default_site: SiteId,
}

impl TenantRouter {
    pub fn new<I, K, V>(sites: I, default_site: &str) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let sites = sites
            .into_iter()
            .map(|(country, site)| {
                (
                    country.as_ref().trim().to_ascii_uppercase(),
                    SiteId::new(site.as_ref()),
                )
            })
            .collect();

        Self {
            sites,
            default_site: SiteId::new(default_site),
        }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_SITES.iter().copied(), DEFAULT_SITE)
    }

    pub fn route(&self, country_code: Option<&str>) -> SiteId {
        country_code
            .map(|code| code.trim().to_ascii_uppercase())
            .and_then(|code| self.sites.get(&code).cloned())
            .unwrap_or_else(|| self.default_site.clone())
    }

    pub fn default_site(&self) -> &SiteId {
        &self.default_site
    }

    pub fn with_default_site(mut self, default_site: &str) -> Self {
        self.default_site = SiteId::new(default_site);
        self
    }

    /// Adds or replaces country entries.
    pub fn extend<I, K, V>(mut self, sites: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (country, site) in sites {
            self.sites.insert(
                country.as_ref().trim().to_ascii_uppercase(),
                SiteId::new(site.as_ref()),
            );
        }
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &SiteId)> {
        self.sites
            .iter()
            .map(|(country, site)| (country.as_str(), site))
    }
}

impl Default for TenantRouter {
    fn default() -> Self {
        Self::standard()
    }
}
