//! Builds validated tenant pools.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tenantry_core::{
    ConnectionConfig, ConnectionFactory, ConnectionHandle, TenantConnection, TenantError,
    TenantResult,
};
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::MssqlConfig;
use crate::pool::{MssqlPool, PoolConfig};

/// [`ConnectionFactory`] producing one [`MssqlPool`] per tenant.
///
/// Each pool is sized by the tenant's `pool_size` and validated with
/// `SELECT 1` before it is handed out.
#[derive(Debug, Clone)]
pub struct MssqlConnectionFactory {
    application_name: Option<String>,
    idle_timeout: Option<Duration>,
    max_lifetime: Option<Duration>,
}

impl Default for MssqlConnectionFactory {
    fn default() -> Self {
        let pool = PoolConfig::default();
        Self {
            application_name: None,
            idle_timeout: pool.idle_timeout,
            max_lifetime: pool.max_lifetime,
        }
    }
}

impl MssqlConnectionFactory {
    /// Create a factory with default pool settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Application name reported to the server.
    pub fn with_application_name(mut self, name: impl Into<String>) -> Self {
        self.application_name = Some(name.into());
        self
    }

    /// Close pooled connections idle for longer than this.
    pub fn with_idle_timeout(mut self, idle: Option<Duration>) -> Self {
        self.idle_timeout = idle;
        self
    }

    /// Recycle pooled connections older than this.
    pub fn with_max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    pub(crate) fn pool_config(&self, config: &ConnectionConfig) -> PoolConfig {
        PoolConfig {
            max_connections: config.pool_size,
            min_connections: None,
            connection_timeout: config.connect_timeout,
            idle_timeout: self.idle_timeout,
            max_lifetime: self.max_lifetime,
        }
    }

    pub(crate) fn mssql_config(&self, config: &ConnectionConfig) -> MssqlConfig {
        let mssql = MssqlConfig::from(config);
        match &self.application_name {
            Some(name) => mssql.with_application_name(name.clone()),
            None => mssql,
        }
    }
}

#[async_trait]
impl ConnectionFactory for MssqlConnectionFactory {
    async fn connect(&self, config: ConnectionConfig) -> TenantResult<ConnectionHandle> {
        let started = Instant::now();
        let deadline = config.connect_timeout;
        let pool = MssqlPool::with_pool_config(self.mssql_config(&config), self.pool_config(&config))
            .await
            .map_err(|e| {
                TenantError::connection(format!(
                    "failed to open pool for database '{}'",
                    config.database
                ))
                .with_source(e)
            })?;

        let validated = match timeout(deadline, pool.validate()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(TenantError::connection(format!(
                "validation query failed for database '{}'",
                config.database
            ))
            .with_source(e)),
            Err(_) => Err(TenantError::timeout("tenant connection validation", deadline)),
        };
        if let Err(err) = validated {
            warn!(
                server = %config.server,
                database = %config.database,
                code = %err.code,
                "tenant pool failed validation"
            );
            pool.close().await;
            return Err(err);
        }

        info!(
            server = %config.server,
            database = %config.database,
            pool_size = config.pool_size,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tenant pool ready"
        );
        Ok(Arc::new(pool))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use tenantry_core::{ConnectionDefaults, ServerAddress};

    fn tenant_config() -> ConnectionConfig {
        ConnectionConfig::new(
            &ServerAddress::parse("sql01,1444").unwrap(),
            "acme_db",
            SecretString::new("acme_user".into()),
            SecretString::new("acme_pass".into()),
            &ConnectionDefaults::default(),
        )
        .with_pool_size(4)
    }

    #[test]
    fn test_pool_sized_by_tenant_config() {
        let factory = MssqlConnectionFactory::new().with_idle_timeout(None);
        let pool = factory.pool_config(&tenant_config());
        assert_eq!(pool.max_connections, 4);
        assert_eq!(pool.connection_timeout, Duration::from_secs(20));
        assert_eq!(pool.idle_timeout, None);
    }

    #[test]
    fn test_application_name_override() {
        let factory = MssqlConnectionFactory::new().with_application_name("workflow-api");
        let mssql = factory.mssql_config(&tenant_config());
        assert_eq!(mssql.application_name.as_deref(), Some("workflow-api"));
        assert_eq!(mssql.port, 1444);
        assert_eq!(mssql.database, "acme_db");
    }
}
