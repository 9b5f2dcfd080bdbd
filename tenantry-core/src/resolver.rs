//! Request to tenant resolution.
//!
//! Identification walks a fixed chain and stops at the first match:
//!
//! 1. an explicit selector: the `database` header, then the `database`
//!    cookie, then the `database` or `DatabaseGUID` query parameter;
//! 2. a loopback host, which maps to the development tenant;
//! 3. the configured default database;
//! 4. the first label of the hostname.
//!
//! The chosen identifier is then turned into a ready connection through the
//! [`ConnectionCache`], falling through to the [`CredentialStore`] and the
//! [`ConnectionFactory`] on a miss.

use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, warn};

use crate::cache::{CacheConfig, ConnectionCache, StaleHandlePolicy};
use crate::config::{ResolutionConfig, TenancyConfig};
use crate::credentials::{CredentialStore, TenantStatus};
use crate::error::{ErrorCode, TenantError, TenantResult};
use crate::handle::{ConnectionFactory, ConnectionHandle};
use crate::id::TenantId;
use crate::metadata::RequestMetadata;

/// Which rule produced the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierSource {
    /// Selector header.
    Header,
    /// Selector cookie.
    Cookie,
    /// Selector or GUID query parameter.
    Query,
    /// Loopback host mapped to the development tenant.
    DevelopmentDefault,
    /// Configured default database.
    ConfiguredDefault,
    /// First label of the hostname.
    Hostname,
}

impl IdentifierSource {
    /// Whether the request named its database explicitly.
    pub fn is_explicit(&self) -> bool {
        matches!(self, Self::Header | Self::Cookie | Self::Query)
    }

    /// Short name for logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Header => "header",
            Self::Cookie => "cookie",
            Self::Query => "query",
            Self::DevelopmentDefault => "development_default",
            Self::ConfiguredDefault => "configured_default",
            Self::Hostname => "hostname",
        }
    }
}

impl fmt::Display for IdentifierSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identification {
    /// The selected tenant.
    pub tenant: TenantId,
    /// Where it came from.
    pub source: IdentifierSource,
    /// For explicit selectors: what the host alone would have selected.
    pub fallback: Option<(TenantId, IdentifierSource)>,
}

/// A tenant together with its ready connection.
#[derive(Clone)]
pub struct ResolvedTenant {
    /// The tenant.
    pub tenant: TenantId,
    /// Where the identifier came from.
    pub source: IdentifierSource,
    /// The tenant's connection.
    pub connection: ConnectionHandle,
}

impl fmt::Debug for ResolvedTenant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedTenant")
            .field("tenant", &self.tenant)
            .field("source", &self.source)
            .field("database", &self.connection.database())
            .finish()
    }
}

struct ResolverInner {
    resolution: ResolutionConfig,
    store: Arc<dyn CredentialStore>,
    factory: Arc<dyn ConnectionFactory>,
    cache: ConnectionCache,
    lookup_timeout: Duration,
}

/// Maps requests to tenants and tenants to ready connections.
#[derive(Clone)]
pub struct TenantResolver {
    inner: Arc<ResolverInner>,
}

impl fmt::Debug for TenantResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantResolver")
            .field("resolution", &self.inner.resolution)
            .field("cache", &self.inner.cache)
            .field("lookup_timeout", &self.inner.lookup_timeout)
            .finish()
    }
}

impl TenantResolver {
    /// Create a builder.
    pub fn builder() -> TenantResolverBuilder {
        TenantResolverBuilder::default()
    }

    /// Resolver wired from a loaded configuration.
    pub fn from_config(
        config: &TenancyConfig,
        store: Arc<dyn CredentialStore>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        Self {
            inner: Arc::new(ResolverInner {
                resolution: config.resolution.clone(),
                store,
                factory,
                cache: ConnectionCache::new(config.cache_config()),
                lookup_timeout: config.control_plane.lookup_timeout(),
            }),
        }
    }

    /// The connection cache.
    pub fn cache(&self) -> &ConnectionCache {
        &self.inner.cache
    }

    /// The resolution settings.
    pub fn resolution(&self) -> &ResolutionConfig {
        &self.inner.resolution
    }

    /// Pick the tenant a request addresses, without any I/O.
    pub fn identify(&self, meta: &RequestMetadata) -> TenantResult<Identification> {
        match self.explicit_selector(meta) {
            Some((tenant, source)) => {
                let fallback = self
                    .host_identifier(meta)
                    .ok()
                    .filter(|(host_tenant, _)| *host_tenant != tenant);
                Ok(Identification {
                    tenant,
                    source,
                    fallback,
                })
            }
            None => {
                let (tenant, source) = self.host_identifier(meta)?;
                Ok(Identification {
                    tenant,
                    source,
                    fallback: None,
                })
            }
        }
    }

    fn explicit_selector(&self, meta: &RequestMetadata) -> Option<(TenantId, IdentifierSource)> {
        let cfg = &self.inner.resolution;
        let non_empty = |v: &str| !v.trim().is_empty();

        if let Some(v) = meta.header(&cfg.selector_header).filter(|v| non_empty(v)) {
            return Some((TenantId::database(v), IdentifierSource::Header));
        }
        if let Some(v) = meta.cookie(&cfg.selector_cookie).filter(|v| non_empty(v)) {
            return Some((TenantId::database(v), IdentifierSource::Cookie));
        }
        if let Some(v) = meta.query_param(&cfg.selector_query).filter(|v| non_empty(v)) {
            return Some((TenantId::database(v), IdentifierSource::Query));
        }
        if let Some(v) = meta.query_param(&cfg.guid_query).filter(|v| non_empty(v)) {
            return Some((TenantId::guid(v), IdentifierSource::Query));
        }
        None
    }

    fn host_identifier(&self, meta: &RequestMetadata) -> TenantResult<(TenantId, IdentifierSource)> {
        let cfg = &self.inner.resolution;
        let host = meta.hostname(cfg.trust_forwarded_host);

        if let Some(host) = host.as_deref().filter(|h| self.is_loopback(h)) {
            return match cfg.development_tenant.as_deref() {
                Some(dev) => Ok((TenantId::domain(dev), IdentifierSource::DevelopmentDefault)),
                None => Err(TenantError::new(
                    ErrorCode::MissingConfiguration,
                    format!(
                        "loopback host '{}' needs resolution.development_tenant to be configured",
                        host
                    ),
                )),
            };
        }
        if let Some(database) = cfg.default_database.as_deref().filter(|d| !d.trim().is_empty()) {
            return Ok((TenantId::database(database), IdentifierSource::ConfiguredDefault));
        }

        let Some(host) = host else {
            return Err(TenantError::new(
                ErrorCode::UnknownTenant,
                "request carries no host to derive a tenant from",
            ));
        };
        if host.parse::<IpAddr>().is_ok() {
            return Err(TenantError::unknown_tenant(&TenantId::domain(&host)));
        }
        let label = host.split('.').next().unwrap_or_default();
        if label.is_empty() {
            return Err(TenantError::unknown_tenant(&TenantId::domain(&host)));
        }
        Ok((TenantId::domain(label), IdentifierSource::Hostname))
    }

    fn is_loopback(&self, host: &str) -> bool {
        self.inner
            .resolution
            .loopback_hosts
            .iter()
            .any(|h| h.eq_ignore_ascii_case(host))
            || host.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
    }

    /// Identify the tenant and produce its ready connection.
    ///
    /// An explicit selector that names no tenant falls back to the host-derived
    /// tenant when `fallback_to_hostname` is set. No other failure falls back.
    pub async fn resolve(&self, meta: &RequestMetadata) -> TenantResult<ResolvedTenant> {
        let ident = self.identify(meta)?;
        match self.connect(&ident.tenant).await {
            Ok(connection) => Ok(ResolvedTenant {
                tenant: ident.tenant,
                source: ident.source,
                connection,
            }),
            Err(err) if err.is_unknown_tenant() && self.inner.resolution.fallback_to_hostname => {
                let Some((tenant, source)) = ident.fallback else {
                    return Err(err);
                };
                debug!(
                    requested = %ident.tenant,
                    fallback = %tenant,
                    "explicit selector matched no tenant, using host"
                );
                let connection = self.connect(&tenant).await?;
                Ok(ResolvedTenant {
                    tenant,
                    source,
                    connection,
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Produce the ready connection for a tenant.
    pub async fn connect(&self, tenant: &TenantId) -> TenantResult<ConnectionHandle> {
        let cache = &self.inner.cache;
        if let StaleHandlePolicy::Revalidate { interval } = cache.config().stale_handle_policy {
            if cache.needs_revalidation(tenant, interval) {
                self.revalidate(tenant).await?;
            }
        }

        let store = self.inner.store.clone();
        let factory = self.inner.factory.clone();
        let lookup_timeout = self.inner.lookup_timeout;
        let key = tenant.clone();
        cache
            .get_or_create(tenant, move || async move {
                let config = timeout(lookup_timeout, store.resolve(&key))
                    .await
                    .map_err(|_| {
                        TenantError::timeout("credential lookup", lookup_timeout).with_tenant(&key)
                    })??;
                let connect_timeout = config.connect_timeout;
                debug!(
                    tenant = %key,
                    server = %config.server,
                    database = %config.database,
                    "opening tenant connection"
                );
                timeout(connect_timeout, factory.connect(config))
                    .await
                    .map_err(|_| {
                        TenantError::timeout("tenant connection", connect_timeout).with_tenant(&key)
                    })?
                    .map_err(|e| match e.tenant {
                        Some(_) => e,
                        None => e.with_tenant(&key),
                    })
            })
            .await
    }

    async fn revalidate(&self, tenant: &TenantId) -> TenantResult<()> {
        let cache = &self.inner.cache;
        let lookup_timeout = self.inner.lookup_timeout;
        match timeout(lookup_timeout, self.inner.store.status(tenant)).await {
            Ok(Ok(TenantStatus::Active)) => {
                cache.mark_validated(tenant);
                Ok(())
            }
            Ok(Ok(TenantStatus::Inactive)) => {
                warn!(tenant = %tenant, "cached tenant was deactivated, evicting");
                cache.evict(tenant);
                Err(TenantError::inactive_tenant(tenant))
            }
            Ok(Err(err)) if err.is_unknown_tenant() || err.is_inactive_tenant() => {
                warn!(tenant = %tenant, code = %err.code, "cached tenant no longer resolvable, evicting");
                cache.evict(tenant);
                Err(err)
            }
            Ok(Err(err)) => {
                warn!(tenant = %tenant, code = %err.code, "tenant status check failed, keeping cached connection");
                Ok(())
            }
            Err(_) => {
                warn!(tenant = %tenant, "tenant status check timed out, keeping cached connection");
                Ok(())
            }
        }
    }
}

/// Builder for [`TenantResolver`].
#[derive(Default)]
pub struct TenantResolverBuilder {
    resolution: ResolutionConfig,
    store: Option<Arc<dyn CredentialStore>>,
    factory: Option<Arc<dyn ConnectionFactory>>,
    cache: Option<ConnectionCache>,
    cache_config: CacheConfig,
    lookup_timeout: Option<Duration>,
}

impl TenantResolverBuilder {
    /// Set the resolution settings.
    pub fn resolution(mut self, resolution: ResolutionConfig) -> Self {
        self.resolution = resolution;
        self
    }

    /// Set the credential store.
    pub fn store(mut self, store: impl CredentialStore) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set a shared credential store.
    pub fn shared_store(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the connection factory.
    pub fn factory(mut self, factory: impl ConnectionFactory) -> Self {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Set a shared connection factory.
    pub fn shared_factory(mut self, factory: Arc<dyn ConnectionFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Use an existing cache instead of creating one.
    pub fn cache(mut self, cache: ConnectionCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Settings for a newly created cache.
    pub fn cache_config(mut self, config: CacheConfig) -> Self {
        self.cache_config = config;
        self
    }

    /// Bound each credential store call.
    pub fn lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = Some(timeout);
        self
    }

    /// Build the resolver.
    pub fn build(self) -> TenantResult<TenantResolver> {
        let store = self.store.ok_or_else(|| TenantError::missing_config("credential store"))?;
        let factory = self
            .factory
            .ok_or_else(|| TenantError::missing_config("connection factory"))?;
        Ok(TenantResolver {
            inner: Arc::new(ResolverInner {
                resolution: self.resolution,
                store,
                factory,
                cache: self
                    .cache
                    .unwrap_or_else(|| ConnectionCache::new(self.cache_config)),
                lookup_timeout: self.lookup_timeout.unwrap_or(Duration::from_secs(5)),
            }),
        })
    }
}
