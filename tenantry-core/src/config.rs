//! Tenancy configuration from TOML and the environment.
//!
//! ```toml
//! [resolution]
//! development_tenant = "dev"
//! fallback_to_hostname = true
//!
//! [connection]
//! pool_size = 10
//! connect_timeout_ms = 20000
//!
//! [cache]
//! eviction_grace_ms = 30000
//! stale_handle_policy = { revalidate = { interval_secs = 60 } }
//!
//! [control_plane]
//! url = "server=tcp:${CP_HOST},1433;database=Elevate;user=svc;password=${CP_PASSWORD}"
//! lookup_timeout_ms = 5000
//!
//! [bypass]
//! rules = ["/webhook/", "POST /rest/signup"]
//! ```
//!
//! Environment variables (see [`TenancyConfig::with_env`]) override file
//! values, and `${VAR}` references in the control-plane URL are expanded.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};
use tracing::warn;

use crate::bypass::{BypassRule, BypassRules};
use crate::cache::{CacheConfig, StaleHandlePolicy};
use crate::credentials::ConnectionDefaults;
use crate::env::{self, EnvSource, StdEnvSource};
use crate::error::{TenantError, TenantResult};

/// Environment variable names.
pub mod vars {
    /// Process-wide default database name.
    pub const DEFAULT_DATABASE: &str = "TENANTRY_DEFAULT_DATABASE";
    /// Tenant used for loopback hosts.
    pub const DEVELOPMENT_TENANT: &str = "TENANTRY_DEVELOPMENT_TENANT";
    /// Credential decryption passphrase.
    pub const PASSPHRASE: &str = "TENANTRY_PASSPHRASE";
    /// Control-plane connection string.
    pub const CONTROL_PLANE_URL: &str = "TENANTRY_CONTROL_PLANE_URL";
    /// Schema for tenant connections.
    pub const SCHEMA: &str = "TENANTRY_SCHEMA";
    /// Pool size for tenant connections.
    pub const POOL_SIZE: &str = "TENANTRY_POOL_SIZE";
    /// Connect timeout in milliseconds.
    pub const CONNECT_TIMEOUT_MS: &str = "TENANTRY_CONNECT_TIMEOUT_MS";
    /// Require TLS for tenant connections.
    pub const ENCRYPT: &str = "TENANTRY_ENCRYPT";
    /// Accept any server certificate.
    pub const TRUST_SERVER_CERTIFICATE: &str = "TENANTRY_TRUST_SERVER_CERTIFICATE";
    /// Control-plane lookup timeout in milliseconds.
    pub const LOOKUP_TIMEOUT_MS: &str = "TENANTRY_LOOKUP_TIMEOUT_MS";
    /// Eviction grace period in milliseconds.
    pub const EVICTION_GRACE_MS: &str = "TENANTRY_EVICTION_GRACE_MS";
    /// Enables revalidation of cached tenants at this interval.
    pub const REVALIDATE_SECS: &str = "TENANTRY_REVALIDATE_SECS";
    /// Comma-separated extra bypass rules.
    pub const BYPASS_PATHS: &str = "TENANTRY_BYPASS_PATHS";
}

/// How a request is mapped to a tenant.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResolutionConfig {
    /// Database used when the request carries no explicit selector.
    pub default_database: Option<String>,
    /// Tenant domain used for loopback hosts.
    pub development_tenant: Option<String>,
    /// Header naming a database.
    pub selector_header: String,
    /// Cookie naming a database.
    pub selector_cookie: String,
    /// Query parameter naming a database.
    pub selector_query: String,
    /// Query parameter carrying a database GUID.
    pub guid_query: String,
    /// Retry with the hostname when an explicit selector names no tenant.
    pub fallback_to_hostname: bool,
    /// Prefer `X-Forwarded-Host` over `Host`.
    pub trust_forwarded_host: bool,
    /// Hosts treated as local development.
    pub loopback_hosts: Vec<String>,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            default_database: None,
            development_tenant: None,
            selector_header: "database".to_string(),
            selector_cookie: "database".to_string(),
            selector_query: "database".to_string(),
            guid_query: "DatabaseGUID".to_string(),
            fallback_to_hostname: true,
            trust_forwarded_host: true,
            loopback_hosts: vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "::1".to_string(),
            ],
        }
    }
}

impl ResolutionConfig {
    /// Set the development tenant.
    pub fn with_development_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.development_tenant = Some(tenant.into());
        self
    }

    /// Set the default database.
    pub fn with_default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = Some(database.into());
        self
    }

    /// Disable the hostname fallback.
    pub fn without_hostname_fallback(mut self) -> Self {
        self.fallback_to_hostname = false;
        self
    }
}

/// Stale handle policy as written in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicySetting {
    /// Keep cached handles until explicit eviction.
    #[default]
    Retain,
    /// Re-check tenant status on cache hits.
    Revalidate {
        /// Seconds between checks.
        interval_secs: u64,
    },
}

/// `[cache]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheSection {
    /// Eviction grace period in milliseconds.
    pub eviction_grace_ms: u64,
    /// Drain poll interval in milliseconds.
    pub drain_poll_ms: u64,
    /// Deactivation handling.
    pub stale_handle_policy: StalePolicySetting,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            eviction_grace_ms: 30_000,
            drain_poll_ms: 250,
            stale_handle_policy: StalePolicySetting::Retain,
        }
    }
}

/// `[control_plane]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlPlaneConfig {
    /// Connection string of the control-plane database.
    pub url: Option<String>,
    /// Shared credential decryption passphrase.
    #[serde(deserialize_with = "deserialize_secret")]
    pub passphrase: Option<SecretString>,
    /// Deadline for each control-plane query, in milliseconds.
    pub lookup_timeout_ms: u64,
    /// Control-plane pool size.
    pub pool_size: u32,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            url: None,
            passphrase: None,
            lookup_timeout_ms: 5_000,
            pool_size: 5,
        }
    }
}

impl ControlPlaneConfig {
    /// The lookup timeout as a duration.
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value
        .filter(|v| !v.is_empty())
        .map(|v| SecretString::new(v.into())))
}

/// `[bypass]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BypassSection {
    /// Rules such as `"/healthz"` or `"POST /rest/login"`.
    pub rules: Vec<String>,
    /// Drop the built-in rules instead of extending them.
    pub replace_defaults: bool,
    /// Let WebSocket upgrades bypass resolution.
    pub websocket_upgrades: bool,
}

impl Default for BypassSection {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            replace_defaults: false,
            websocket_upgrades: true,
        }
    }
}

/// Complete tenancy configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TenancyConfig {
    /// Request to tenant mapping.
    pub resolution: ResolutionConfig,
    /// Settings applied to every tenant connection.
    pub connection: ConnectionDefaults,
    /// Connection cache behaviour.
    pub cache: CacheSection,
    /// Control-plane access.
    pub control_plane: ControlPlaneConfig,
    /// Paths that skip resolution.
    pub bypass: BypassSection,
}

impl TenancyConfig {
    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> TenantResult<Self> {
        toml::from_str(s).map_err(|e| {
            TenantError::invalid_config(format!("invalid tenancy configuration: {}", e.message()))
                .with_source(e)
        })
    }

    /// Read and parse a TOML file.
    pub fn load(path: impl AsRef<Path>) -> TenantResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            TenantError::invalid_config(format!("cannot read {}: {}", path.display(), e))
                .with_source(e)
        })?;
        Self::from_toml_str(&content)
    }

    /// Defaults overlaid with the process environment.
    pub fn from_env() -> TenantResult<Self> {
        Self::default().with_env(&StdEnvSource)
    }

    /// Overlay `TENANTRY_*` variables and expand `${VAR}` references in the
    /// control-plane URL.
    pub fn with_env(mut self, env: &dyn EnvSource) -> TenantResult<Self> {
        if let Some(v) = env.get_non_empty(vars::DEFAULT_DATABASE) {
            self.resolution.default_database = Some(v);
        }
        if let Some(v) = env.get_non_empty(vars::DEVELOPMENT_TENANT) {
            self.resolution.development_tenant = Some(v);
        }
        if let Some(v) = env.get_non_empty(vars::PASSPHRASE) {
            self.control_plane.passphrase = Some(SecretString::new(v.into()));
        }
        if let Some(v) = env.get_non_empty(vars::CONTROL_PLANE_URL) {
            self.control_plane.url = Some(v);
        }
        if let Some(v) = env.get_non_empty(vars::SCHEMA) {
            self.connection.schema = v;
        }
        if let Some(v) = parse_var(env, vars::POOL_SIZE)? {
            self.connection.pool_size = v;
        }
        if let Some(v) = parse_var(env, vars::CONNECT_TIMEOUT_MS)? {
            self.connection.connect_timeout_ms = v;
        }
        if let Some(v) = parse_flag(env, vars::ENCRYPT)? {
            self.connection.encrypt = v;
        }
        if let Some(v) = parse_flag(env, vars::TRUST_SERVER_CERTIFICATE)? {
            self.connection.trust_cert = v;
        }
        if let Some(v) = parse_var(env, vars::LOOKUP_TIMEOUT_MS)? {
            self.control_plane.lookup_timeout_ms = v;
        }
        if let Some(v) = parse_var(env, vars::EVICTION_GRACE_MS)? {
            self.cache.eviction_grace_ms = v;
        }
        if let Some(v) = parse_var::<u64>(env, vars::REVALIDATE_SECS)? {
            self.cache.stale_handle_policy = if v == 0 {
                StalePolicySetting::Retain
            } else {
                StalePolicySetting::Revalidate { interval_secs: v }
            };
        }
        if let Some(v) = env.get_non_empty(vars::BYPASS_PATHS) {
            self.bypass
                .rules
                .extend(v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(String::from));
        }
        if let Some(url) = self.control_plane.url.take() {
            self.control_plane.url = Some(env::expand(&url, env)?);
        }
        Ok(self)
    }

    /// Reject unusable values. A missing passphrase or control-plane URL is
    /// not an error: default-mode operation continues and tenant lookups fail
    /// with a missing configuration error.
    pub fn validate(&self) -> TenantResult<()> {
        if self.connection.pool_size == 0 {
            return Err(TenantError::invalid_config("connection.pool_size must be at least 1"));
        }
        if self.control_plane.pool_size == 0 {
            return Err(TenantError::invalid_config("control_plane.pool_size must be at least 1"));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(TenantError::invalid_config("connection.connect_timeout_ms must be positive"));
        }
        if self.control_plane.lookup_timeout_ms == 0 {
            return Err(TenantError::invalid_config(
                "control_plane.lookup_timeout_ms must be positive",
            ));
        }
        if let StalePolicySetting::Revalidate { interval_secs: 0 } = self.cache.stale_handle_policy {
            return Err(TenantError::invalid_config(
                "cache.stale_handle_policy revalidate interval must be positive",
            ));
        }
        if self.bypass.rules.iter().any(|r| BypassRule::parse(r).is_none()) {
            return Err(TenantError::invalid_config("bypass.rules must not contain empty entries"));
        }
        if !self.tenant_mode_enabled() {
            warn!(
                passphrase = self.control_plane.passphrase.is_some(),
                control_plane = self.control_plane.url.is_some(),
                "tenant resolution is not fully configured; only the default connection will be served"
            );
        }
        Ok(())
    }

    /// Whether both a control-plane URL and a passphrase are set.
    pub fn tenant_mode_enabled(&self) -> bool {
        self.control_plane.url.is_some() && self.control_plane.passphrase.is_some()
    }

    /// Runtime cache settings.
    pub fn cache_config(&self) -> CacheConfig {
        let policy = match self.cache.stale_handle_policy {
            StalePolicySetting::Retain => StaleHandlePolicy::Retain,
            StalePolicySetting::Revalidate { interval_secs } => StaleHandlePolicy::Revalidate {
                interval: Duration::from_secs(interval_secs),
            },
        };
        CacheConfig::default()
            .with_eviction_grace(Duration::from_millis(self.cache.eviction_grace_ms))
            .with_drain_poll(Duration::from_millis(self.cache.drain_poll_ms))
            .with_stale_handle_policy(policy)
    }

    /// Effective bypass rules.
    pub fn bypass_rules(&self) -> BypassRules {
        let mut rules = if self.bypass.replace_defaults {
            BypassRules::none()
        } else {
            BypassRules::defaults()
        };
        rules.extend(self.bypass.rules.iter().filter_map(|r| BypassRule::parse(r)));
        rules.with_websocket_upgrades(self.bypass.websocket_upgrades)
    }
}

fn parse_var<T: std::str::FromStr>(env: &dyn EnvSource, name: &str) -> TenantResult<Option<T>> {
    env.get_non_empty(name)
        .map(|v| {
            v.trim()
                .parse::<T>()
                .map_err(|_| TenantError::invalid_config(format!("{} has invalid value '{}'", name, v)))
        })
        .transpose()
}

fn parse_flag(env: &dyn EnvSource, name: &str) -> TenantResult<Option<bool>> {
    env.get_non_empty(name)
        .map(|v| match v.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(TenantError::invalid_config(format!(
                "{} must be a boolean, got '{}'",
                name, v
            ))),
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::MapEnvSource;
    use crate::metadata::RequestMetadata;
    use crate::ErrorCode;
    use pretty_assertions::assert_eq;
    use secrecy::ExposeSecret;

    #[test]
    fn test_defaults() {
        let config = TenancyConfig::default();
        assert_eq!(config.connection.pool_size, 10);
        assert_eq!(config.connection.connect_timeout_ms, 20_000);
        assert_eq!(config.control_plane.pool_size, 5);
        assert_eq!(config.resolution.guid_query, "DatabaseGUID");
        assert!(!config.tenant_mode_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let config = TenancyConfig::from_toml_str(
            r#"
            [resolution]
            development_tenant = "dev"
            default_database = "globalcorp"

            [connection]
            pool_size = 4
            encrypt = true

            [cache]
            stale_handle_policy = { revalidate = { interval_secs = 60 } }

            [control_plane]
            url = "server=sql01;database=Elevate"
            passphrase = "open sesame"

            [bypass]
            rules = ["/webhook/"]
            "#,
        )
        .unwrap();

        assert_eq!(config.resolution.development_tenant.as_deref(), Some("dev"));
        assert_eq!(config.connection.pool_size, 4);
        assert!(config.connection.encrypt);
        assert_eq!(config.connection.port, 1433);
        assert_eq!(
            config.cache_config().stale_handle_policy,
            StaleHandlePolicy::Revalidate {
                interval: Duration::from_secs(60)
            }
        );
        assert_eq!(
            config.control_plane.passphrase.as_ref().map(|p| p.expose_secret()),
            Some("open sesame")
        );
        assert!(config.tenant_mode_enabled());
        assert!(config.bypass_rules().matches(&RequestMetadata::new("POST", "/webhook/abc")));
        assert!(config.bypass_rules().matches(&RequestMetadata::new("GET", "/healthz")));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = TenancyConfig::from_toml_str("[resolution]\nsubdomain = \"x\"\n").unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidConfiguration);
    }

    #[test]
    fn test_retain_policy_string() {
        let config = TenancyConfig::from_toml_str("[cache]\nstale_handle_policy = \"retain\"\n").unwrap();
        assert_eq!(config.cache_config().stale_handle_policy, StaleHandlePolicy::Retain);
    }

    #[test]
    fn test_env_overlay() {
        let env = MapEnvSource::new()
            .set(vars::DEVELOPMENT_TENANT, "dev")
            .set(vars::PASSPHRASE, "from-env")
            .set(vars::POOL_SIZE, "20")
            .set(vars::TRUST_SERVER_CERTIFICATE, "yes")
            .set(vars::REVALIDATE_SECS, "30")
            .set(vars::BYPASS_PATHS, "/webhook/, POST /rest/signup")
            .set(vars::CONTROL_PLANE_URL, "server=${CP_HOST};database=Elevate")
            .set("CP_HOST", "sql01");

        let config = TenancyConfig::default().with_env(&env).unwrap();
        assert_eq!(config.resolution.development_tenant.as_deref(), Some("dev"));
        assert_eq!(config.connection.pool_size, 20);
        assert!(config.connection.trust_cert);
        assert_eq!(
            config.control_plane.url.as_deref(),
            Some("server=sql01;database=Elevate")
        );
        assert_eq!(
            config.cache.stale_handle_policy,
            StalePolicySetting::Revalidate { interval_secs: 30 }
        );
        let rules = config.bypass_rules();
        assert!(rules.matches(&RequestMetadata::new("POST", "/rest/signup")));
        assert!(!rules.matches(&RequestMetadata::new("GET", "/rest/signup")));
    }

    #[test]
    fn test_env_invalid_number() {
        let env = MapEnvSource::new().set(vars::POOL_SIZE, "many");
        let err = TenancyConfig::default().with_env(&env).unwrap_err();
        assert!(err.message.contains(vars::POOL_SIZE));
    }

    #[test]
    fn test_validate_rejects_zero() {
        let mut config = TenancyConfig::default();
        config.connection.pool_size = 0;
        assert_eq!(config.validate().unwrap_err().code, ErrorCode::InvalidConfiguration);

        let mut config = TenancyConfig::default();
        config.cache.stale_handle_policy = StalePolicySetting::Revalidate { interval_secs: 0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_passphrase() {
        let env = MapEnvSource::new().set(vars::PASSPHRASE, "open sesame");
        let config = TenancyConfig::default().with_env(&env).unwrap();
        assert!(!format!("{:?}", config).contains("open sesame"));
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenancy.toml");
        std::fs::write(&path, "[resolution]\ndevelopment_tenant = \"dev\"\n").unwrap();
        let config = TenancyConfig::load(&path).unwrap();
        assert_eq!(config.resolution.development_tenant.as_deref(), Some("dev"));

        assert!(TenancyConfig::load(dir.path().join("missing.toml")).is_err());
    }
}
