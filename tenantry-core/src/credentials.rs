//! Connection parameters and the credential store seam.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{TenantError, TenantResult};
use crate::id::{IdentifierKind, TenantId};

/// Where a server lives: `host`, `host\INSTANCE` or `host,port`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Host name or address.
    pub host: String,
    /// Explicit port, when given with `host,port`.
    pub port: Option<u16>,
    /// Named instance, when given with `host\INSTANCE`.
    pub instance: Option<String>,
}

impl ServerAddress {
    /// Parse a SQL Server style address.
    pub fn parse(s: &str) -> TenantResult<Self> {
        let s = s.trim();
        let (host, port) = match s.split_once(',') {
            Some((host, port)) => {
                let port = port.trim().parse::<u16>().map_err(|_| {
                    TenantError::invalid_config(format!("invalid port in server address '{}'", s))
                })?;
                (host.trim(), Some(port))
            }
            None => (s, None),
        };
        let (host, instance) = match host.split_once('\\') {
            Some((host, instance)) if !instance.is_empty() => (host, Some(instance.to_string())),
            Some((host, _)) => (host, None),
            None => (host, None),
        };
        if host.is_empty() {
            return Err(TenantError::invalid_config("server address has no host"));
        }
        Ok(Self {
            host: host.to_string(),
            port,
            instance,
        })
    }
}

/// Settings shared by every tenant connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionDefaults {
    /// Schema the application objects live in.
    pub schema: String,
    /// Port used when the address names none.
    pub port: u16,
    /// Maximum connections per tenant pool.
    pub pool_size: u32,
    /// Connect and validation deadline, in milliseconds.
    pub connect_timeout_ms: u64,
    /// Require TLS.
    pub encrypt: bool,
    /// Accept any server certificate.
    pub trust_cert: bool,
}

impl Default for ConnectionDefaults {
    fn default() -> Self {
        Self {
            schema: "dbo".to_string(),
            port: 1433,
            pool_size: 10,
            connect_timeout_ms: 20_000,
            encrypt: false,
            trust_cert: false,
        }
    }
}

impl ConnectionDefaults {
    /// The connect timeout as a duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// Everything needed to open one tenant's store.
#[derive(Clone)]
pub struct ConnectionConfig {
    /// Server host.
    pub server: String,
    /// Server port.
    pub port: u16,
    /// Named instance.
    pub instance: Option<String>,
    /// Database name.
    pub database: String,
    /// Login name, decrypted on read.
    pub username: SecretString,
    /// Password, decrypted on read.
    pub password: SecretString,
    /// Schema name.
    pub schema: String,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// Connect deadline.
    pub connect_timeout: Duration,
    /// Require TLS.
    pub encrypt: bool,
    /// Accept any server certificate.
    pub trust_cert: bool,
}

impl ConnectionConfig {
    /// Build a configuration from an address and credentials, taking the
    /// remaining settings from `defaults`.
    pub fn new(
        address: &ServerAddress,
        database: impl Into<String>,
        username: SecretString,
        password: SecretString,
        defaults: &ConnectionDefaults,
    ) -> Self {
        Self {
            server: address.host.clone(),
            port: address.port.unwrap_or(defaults.port),
            instance: address.instance.clone(),
            database: database.into(),
            username,
            password,
            schema: defaults.schema.clone(),
            pool_size: defaults.pool_size,
            connect_timeout: defaults.connect_timeout(),
            encrypt: defaults.encrypt,
            trust_cert: defaults.trust_cert,
        }
    }

    /// Override the pool size.
    pub fn with_pool_size(mut self, size: u32) -> Self {
        self.pool_size = size;
        self
    }

    /// Whether both credentials are present.
    pub fn has_credentials(&self) -> bool {
        !self.username.expose_secret().is_empty() && !self.password.expose_secret().is_empty()
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("instance", &self.instance)
            .field("database", &self.database)
            .field("username", &"[REDACTED]")
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("pool_size", &self.pool_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("encrypt", &self.encrypt)
            .field("trust_cert", &self.trust_cert)
            .finish()
    }
}

/// Control-plane view of a tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantRecord {
    /// Company id.
    pub id: i64,
    /// Company GUID; salts the credential passphrase.
    pub guid: String,
    /// Company domain.
    pub domain: String,
    /// Disabled flag.
    pub inactive: bool,
}

impl TenantRecord {
    /// The record's status.
    pub fn status(&self) -> TenantStatus {
        if self.inactive {
            TenantStatus::Inactive
        } else {
            TenantStatus::Active
        }
    }
}

/// Whether a tenant may be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TenantStatus {
    /// Tenant may be served.
    Active,
    /// Tenant is disabled.
    Inactive,
}

/// Resolves tenant identifiers into connection parameters.
///
/// Implementations fail closed: an inactive tenant yields
/// [`ErrorCode::InactiveTenant`](crate::ErrorCode::InactiveTenant) before any
/// credential is read, and an absent one yields
/// [`ErrorCode::UnknownTenant`](crate::ErrorCode::UnknownTenant).
#[async_trait]
pub trait CredentialStore: Send + Sync + 'static {
    /// Resolve the tenant's connection configuration.
    async fn resolve(&self, tenant: &TenantId) -> TenantResult<ConnectionConfig>;

    /// Report whether the tenant is active, without touching credentials.
    async fn status(&self, tenant: &TenantId) -> TenantResult<TenantStatus>;
}

#[async_trait]
impl<S: CredentialStore + ?Sized> CredentialStore for Arc<S> {
    async fn resolve(&self, tenant: &TenantId) -> TenantResult<ConnectionConfig> {
        (**self).resolve(tenant).await
    }

    async fn status(&self, tenant: &TenantId) -> TenantResult<TenantStatus> {
        (**self).status(tenant).await
    }
}

#[derive(Clone)]
struct StaticEntry {
    config: ConnectionConfig,
    domain: String,
    guid: Option<String>,
    inactive: bool,
}

/// In-memory credential store for development, tests and tooling.
///
/// A registered tenant answers to its domain, its database name and (when
/// given) its database GUID.
#[derive(Clone, Default)]
pub struct StaticCredentialStore {
    tenants: Arc<RwLock<HashMap<String, StaticEntry>>>,
}

impl StaticCredentialStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tenant by domain.
    pub fn register(&self, domain: &str, config: ConnectionConfig) -> &Self {
        self.register_with_guid(domain, None, config)
    }

    /// Register a tenant by domain and database GUID.
    pub fn register_with_guid(
        &self,
        domain: &str,
        guid: Option<&str>,
        config: ConnectionConfig,
    ) -> &Self {
        let domain = TenantId::domain(domain).into_inner();
        self.tenants.write().insert(
            domain.clone(),
            StaticEntry {
                config,
                domain,
                guid: guid.map(|g| TenantId::guid(g).into_inner()),
                inactive: false,
            },
        );
        self
    }

    /// Mark a tenant inactive. Returns false if it is not registered.
    pub fn deactivate(&self, domain: &str) -> bool {
        self.set_inactive(domain, true)
    }

    /// Mark a tenant active again.
    pub fn activate(&self, domain: &str) -> bool {
        self.set_inactive(domain, false)
    }

    fn set_inactive(&self, domain: &str, inactive: bool) -> bool {
        let key = TenantId::domain(domain).into_inner();
        match self.tenants.write().get_mut(&key) {
            Some(entry) => {
                entry.inactive = inactive;
                true
            }
            None => false,
        }
    }

    /// Remove a tenant.
    pub fn remove(&self, domain: &str) -> bool {
        let key = TenantId::domain(domain).into_inner();
        self.tenants.write().remove(&key).is_some()
    }

    /// Number of registered tenants.
    pub fn len(&self) -> usize {
        self.tenants.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.tenants.read().is_empty()
    }

    fn lookup(&self, tenant: &TenantId) -> TenantResult<StaticEntry> {
        let tenants = self.tenants.read();
        let found = match tenant.kind() {
            IdentifierKind::Domain => tenants.get(tenant.as_str()).cloned(),
            IdentifierKind::DatabaseName => tenants
                .values()
                .find(|e| e.config.database == tenant.as_str())
                .cloned(),
            IdentifierKind::DatabaseGuid => tenants
                .values()
                .find(|e| e.guid.as_deref() == Some(tenant.as_str()))
                .cloned(),
        };
        found.ok_or_else(|| TenantError::unknown_tenant(tenant))
    }
}

impl fmt::Debug for StaticCredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tenants = self.tenants.read();
        let mut domains: Vec<&str> = tenants.values().map(|e| e.domain.as_str()).collect();
        domains.sort_unstable();
        f.debug_struct("StaticCredentialStore")
            .field("tenants", &domains)
            .finish()
    }
}

#[async_trait]
impl CredentialStore for StaticCredentialStore {
    async fn resolve(&self, tenant: &TenantId) -> TenantResult<ConnectionConfig> {
        let entry = self.lookup(tenant)?;
        if entry.inactive {
            return Err(TenantError::inactive_tenant(tenant));
        }
        Ok(entry.config)
    }

    async fn status(&self, tenant: &TenantId) -> TenantResult<TenantStatus> {
        let entry = self.lookup(tenant)?;
        Ok(if entry.inactive {
            TenantStatus::Inactive
        } else {
            TenantStatus::Active
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(database: &str) -> ConnectionConfig {
        ConnectionConfig::new(
            &ServerAddress::parse("sql.internal").unwrap(),
            database,
            SecretString::new("app".to_string().into()),
            SecretString::new("hunter2".to_string().into()),
            &ConnectionDefaults::default(),
        )
    }

    #[test]
    fn test_parse_address() {
        assert_eq!(
            ServerAddress::parse("sql01\\PROD").unwrap(),
            ServerAddress {
                host: "sql01".to_string(),
                port: None,
                instance: Some("PROD".to_string()),
            }
        );
        assert_eq!(ServerAddress::parse("sql01, 14330").unwrap().port, Some(14330));
        assert!(ServerAddress::parse("sql01,http").is_err());
        assert!(ServerAddress::parse("").is_err());
    }

    #[test]
    fn test_defaults_applied() {
        let cfg = config("acme_db");
        assert_eq!(cfg.port, 1433);
        assert_eq!(cfg.pool_size, 10);
        assert_eq!(cfg.connect_timeout, Duration::from_secs(20));
        assert!(cfg.has_credentials());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let rendered = format!("{:?}", config("acme_db"));
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("\"app\""));
        assert!(rendered.contains("acme_db"));
    }

    #[tokio::test]
    async fn test_static_store_lookup_paths() {
        let store = StaticCredentialStore::new();
        store.register_with_guid("acme", Some("ABC-1"), config("acme_db"));

        for id in [
            TenantId::domain("ACME"),
            TenantId::database("acme_db"),
            TenantId::guid("abc-1"),
        ] {
            assert_eq!(store.resolve(&id).await.unwrap().database, "acme_db");
        }
        assert!(store.resolve(&TenantId::domain("other")).await.unwrap_err().is_unknown_tenant());
    }

    #[tokio::test]
    async fn test_inactive_fails_closed() {
        let store = StaticCredentialStore::new();
        store.register("acme", config("acme_db"));
        assert!(store.deactivate("acme"));

        let err = store.resolve(&TenantId::domain("acme")).await.unwrap_err();
        assert!(err.is_inactive_tenant());
        assert_eq!(store.status(&TenantId::domain("acme")).await.unwrap(), TenantStatus::Inactive);

        store.activate("acme");
        assert!(store.resolve(&TenantId::domain("acme")).await.is_ok());
    }
}
