//! Connection pool for Microsoft SQL Server.

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bb8::Pool;
use bb8_tiberius::ConnectionManager;
use parking_lot::RwLock;
use tenantry_core::TenantConnection;
use tracing::{debug, info};

use crate::config::MssqlConfig;
use crate::connection::MssqlConnection;
use crate::error::{MssqlError, MssqlResult};

type TiberiusPool = Pool<ConnectionManager>;

/// A connection pool for one SQL Server database.
///
/// Implements [`TenantConnection`], so a pool can be cached per tenant and
/// shared through a [`ConnectionHandle`](tenantry_core::ConnectionHandle).
pub struct MssqlPool {
    inner: RwLock<Option<TiberiusPool>>,
    closed: AtomicBool,
    config: Arc<MssqlConfig>,
    max_size: u32,
}

impl std::fmt::Debug for MssqlPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlPool")
            .field("host", &self.config.host)
            .field("database", &self.config.database)
            .field("max_size", &self.max_size)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish()
    }
}

impl MssqlPool {
    /// Create a new connection pool from configuration.
    pub async fn new(config: MssqlConfig) -> MssqlResult<Self> {
        Self::with_pool_config(config, PoolConfig::default()).await
    }

    /// Create a new connection pool with custom pool configuration.
    pub async fn with_pool_config(
        config: MssqlConfig,
        pool_config: PoolConfig,
    ) -> MssqlResult<Self> {
        if pool_config.max_connections == 0 {
            return Err(MssqlError::config("pool size must be at least 1"));
        }
        let mgr = ConnectionManager::new(config.to_tiberius_config()?);

        let pool = Pool::builder()
            .max_size(pool_config.max_connections)
            .min_idle(pool_config.min_connections)
            .connection_timeout(pool_config.connection_timeout)
            .idle_timeout(pool_config.idle_timeout)
            .max_lifetime(pool_config.max_lifetime)
            .build(mgr)
            .await
            .map_err(|e| MssqlError::pool(format!("failed to create pool: {}", e)))?;

        info!(
            host = %config.host,
            port = %config.port,
            database = %config.database,
            max_connections = pool_config.max_connections,
            "MSSQL connection pool created"
        );

        Ok(Self {
            inner: RwLock::new(Some(pool)),
            closed: AtomicBool::new(false),
            config: Arc::new(config),
            max_size: pool_config.max_connections,
        })
    }

    /// Create a builder for configuring the pool.
    pub fn builder() -> MssqlPoolBuilder {
        MssqlPoolBuilder::new()
    }

    fn pool(&self) -> MssqlResult<TiberiusPool> {
        self.inner
            .read()
            .clone()
            .ok_or_else(|| MssqlError::Closed(self.config.database.clone()))
    }

    /// Get a connection from the pool.
    ///
    /// Fails with [`MssqlError::Closed`] once the pool has been closed.
    pub async fn get(&self) -> MssqlResult<MssqlConnection> {
        debug!(database = %self.config.database, "Acquiring connection from pool");
        let client = self.pool()?.get_owned().await?;
        Ok(MssqlConnection::new(client))
    }

    /// Get the current pool status.
    pub fn status(&self) -> PoolStatus {
        match self.inner.read().as_ref() {
            Some(pool) => {
                let state = pool.state();
                PoolStatus {
                    connections: state.connections,
                    idle_connections: state.idle_connections,
                    max_size: self.max_size,
                }
            }
            None => PoolStatus {
                connections: 0,
                idle_connections: 0,
                max_size: self.max_size,
            },
        }
    }

    /// Get the pool configuration.
    pub fn config(&self) -> &MssqlConfig {
        &self.config
    }

    /// Check a connection out and run `SELECT 1` on it.
    pub async fn validate(&self) -> MssqlResult<()> {
        self.get().await?.ping().await
    }

    /// Whether [`validate`](Self::validate) succeeds.
    pub async fn is_healthy(&self) -> bool {
        self.validate().await.is_ok()
    }

    fn shut(&self) -> bool {
        self.closed.store(true, Ordering::Release);
        self.inner.write().take().is_some()
    }
}

#[async_trait]
impl TenantConnection for MssqlPool {
    fn is_ready(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn database(&self) -> &str {
        &self.config.database
    }

    async fn close(&self) {
        if self.shut() {
            info!(database = %self.config.database, "MSSQL connection pool closed");
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Pool status information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    /// Current number of connections (including idle).
    pub connections: u32,
    /// Number of idle connections.
    pub idle_connections: u32,
    /// Maximum size of the pool.
    pub max_size: u32,
}

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// Minimum number of idle connections to keep.
    pub min_connections: Option<u32>,
    /// Maximum time to wait for a connection.
    pub connection_timeout: Duration,
    /// Maximum idle time before a connection is closed.
    pub idle_timeout: Option<Duration>,
    /// Maximum lifetime of a connection.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: None,
            connection_timeout: Duration::from_secs(20),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }
}

impl PoolConfig {
    /// Set the maximum number of connections.
    pub fn with_max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the connection checkout timeout.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// Builder for creating a connection pool.
#[derive(Debug, Default)]
pub struct MssqlPoolBuilder {
    config: Option<MssqlConfig>,
    connection_string: Option<String>,
    pool_config: PoolConfig,
}

impl MssqlPoolBuilder {
    /// Create a new pool builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the connection string.
    pub fn connection_string(mut self, conn_str: impl Into<String>) -> Self {
        self.connection_string = Some(conn_str.into());
        self
    }

    /// Set the configuration.
    pub fn config(mut self, config: MssqlConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.pool_config.max_connections = n;
        self
    }

    /// Set the minimum number of idle connections.
    pub fn min_connections(mut self, n: u32) -> Self {
        self.pool_config.min_connections = Some(n);
        self
    }

    /// Set the connection timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.connection_timeout = timeout;
        self
    }

    /// Set the idle timeout.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.pool_config.idle_timeout = Some(timeout);
        self
    }

    /// Set the maximum connection lifetime.
    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.pool_config.max_lifetime = Some(lifetime);
        self
    }

    fn resolve_config(&mut self) -> MssqlResult<MssqlConfig> {
        if let Some(config) = self.config.take() {
            Ok(config)
        } else if let Some(conn_str) = self.connection_string.take() {
            MssqlConfig::from_connection_string(&conn_str)
        } else {
            Err(MssqlError::config("no connection string or config provided"))
        }
    }

    /// Build the connection pool.
    pub async fn build(mut self) -> MssqlResult<MssqlPool> {
        let config = self.resolve_config()?;
        MssqlPool::with_pool_config(config, self.pool_config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_default() {
        let config = PoolConfig::default();
        assert_eq!(config.max_connections, 10);
        assert_eq!(config.min_connections, None);
        assert_eq!(config.connection_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_pool_builder() {
        let mut builder = MssqlPoolBuilder::new()
            .connection_string("Server=sql01;Database=Elevate;User Id=svc;Password=pw")
            .max_connections(5);

        assert_eq!(builder.pool_config.max_connections, 5);
        assert_eq!(builder.resolve_config().unwrap().database, "Elevate");
    }

    #[test]
    fn test_pool_builder_requires_source() {
        let mut builder = MssqlPoolBuilder::new();
        assert!(matches!(builder.resolve_config(), Err(MssqlError::Config(_))));
    }

    #[tokio::test]
    async fn test_zero_sized_pool_rejected() {
        let config = MssqlConfig::from_connection_string(
            "Server=sql01;Database=Elevate;User Id=svc;Password=pw",
        )
        .unwrap();
        let err = MssqlPool::with_pool_config(config, PoolConfig::default().with_max_connections(0))
            .await
            .unwrap_err();
        assert!(matches!(err, MssqlError::Config(_)));
    }
}
