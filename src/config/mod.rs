mod policy;

pub use policy::{ListingPolicy, PolicyOverrides};

use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            AppEnvironment::Development => "development",
            AppEnvironment::Test => "test",
            AppEnvironment::Production => "production",
        }
    }
}

impl fmt::Display for AppEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub listings: ListingPolicy,
    /// JSON file of accounts seeded into the in-memory account store.
    pub accounts_seed: Option<PathBuf>,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let log_format = env::var("APP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                log_format,
            },
            listings: load_listing_policy()?,
            accounts_seed: non_empty_var("LISTING_ACCOUNTS_PATH").map(PathBuf::from),
        })
    }
}

fn load_listing_policy() -> Result<ListingPolicy, ConfigError> {
    let mut policy = match non_empty_var("LISTING_POLICY_PATH") {
        Some(path) => ListingPolicy::from_file(Path::new(&path))?,
        None => ListingPolicy::default(),
    };

    if let Some(site) = non_empty_var("LISTING_DEFAULT_SITE") {
        policy.tenants = policy.tenants.with_default_site(&site);
    }
    if let Some(max) = count_var("LISTING_MAX_SALE_IMAGES")? {
        policy.image_ceilings.sale = max;
    }
    if let Some(max) = count_var("LISTING_MAX_RENTAL_IMAGES")? {
        policy.image_ceilings.rental = max;
    }

    Ok(policy)
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn count_var(name: &'static str) -> Result<Option<usize>, ConfigError> {
    non_empty_var(name)
        .map(|value| {
            value
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidNumber { var: name, value })
        })
        .transpose()
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    /// One of `compact` (default), `pretty` or `full`.
    pub log_format: String,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidNumber {
        var: &'static str,
        value: String,
    },
    PolicyFile {
        path: PathBuf,
        source: std::io::Error,
    },
    PolicyFormat {
        path: PathBuf,
        source: serde_json::Error,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidNumber { var, value } => {
                write!(f, "{var} must be a non-negative integer, got '{value}'")
            }
            ConfigError::PolicyFile { path, .. } => {
                write!(f, "unable to read listing policy file {}", path.display())
            }
            ConfigError::PolicyFormat { path, .. } => {
                write!(f, "listing policy file {} is not valid", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidNumber { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::PolicyFile { source, .. } => Some(source),
            ConfigError::PolicyFormat { source, .. } => Some(source),
        }
    }
}
