//! Credential store backed by the control-plane database.
//!
//! The control plane holds one `company` row per tenant, the tenant's
//! databases in `voyagerdb` and their encrypted logins in `voyagerdbcred`.
//! Logins are decrypted server side with `DecryptByPassphrase`, keyed by the
//! shared passphrase salted with the company GUID. The passphrase is always
//! bound as a parameter.
//!
//! A lookup runs in two steps. The tenant record is read first and an
//! inactive tenant is rejected before any credential is touched. Only then
//! are the credentials decrypted.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use tenantry_core::config::vars;
use tenantry_core::{
    ConnectionConfig, ConnectionDefaults, CredentialStore, ErrorCode, IdentifierKind,
    ServerAddress, TenancyConfig, TenantError, TenantId, TenantRecord, TenantResult,
    TenantStatus,
};
use tiberius::{Row, ToSql};
use tokio::time::timeout;
use tracing::{debug, error, warn};

use crate::config::MssqlConfig;
use crate::error::MssqlError;
use crate::pool::{MssqlPool, PoolConfig};
use crate::row::{FromMssqlRow, MssqlRow};

const RECORD_COLUMNS: &str = "CAST(c.id AS BIGINT) AS id, \
     CAST(c.[guid] AS VARCHAR(36)) AS [guid], \
     c.domain, \
     CAST(ISNULL(c.inactive, 0) AS BIT) AS inactive";

const CREDENTIAL_COLUMNS: &str = "db.instance, \
     db.[database], \
     CAST(DecryptByPassphrase(@P1 + '-' + c.[guid], cred.[user]) AS VARCHAR(100)) AS [user], \
     CAST(DecryptByPassphrase(@P1 + '-' + c.[guid], cred.[pass]) AS VARCHAR(100)) AS pass";

/// SQL selecting the tenant record. Binds the identifier as `@P1`.
pub fn record_query(kind: IdentifierKind) -> String {
    match kind {
        IdentifierKind::Domain => format!(
            "SELECT TOP 1 {} FROM company c WHERE c.domain = @P1",
            RECORD_COLUMNS
        ),
        IdentifierKind::DatabaseName => format!(
            "SELECT TOP 1 {} FROM voyagerdb db JOIN company c ON c.id = db.companyid \
             WHERE db.[name] = @P1",
            RECORD_COLUMNS
        ),
        IdentifierKind::DatabaseGuid => format!(
            "SELECT TOP 1 {} FROM voyagerdb db JOIN company c ON c.id = db.companyid \
             WHERE db.[guid] = @P1",
            RECORD_COLUMNS
        ),
    }
}

/// SQL decrypting the tenant's credentials. Binds the passphrase as `@P1`
/// and the identifier as `@P2`.
pub fn credential_query(kind: IdentifierKind) -> String {
    let filter = match kind {
        IdentifierKind::Domain => "c.domain = @P2",
        IdentifierKind::DatabaseName => "db.[name] = @P2",
        IdentifierKind::DatabaseGuid => "db.[guid] = @P2",
    };
    format!(
        "SELECT TOP 1 {} FROM voyagerdb db \
         JOIN voyagerdbcred cred ON cred.voyagerdbid = db.id \
         JOIN company c ON c.id = db.companyid \
         WHERE {}",
        CREDENTIAL_COLUMNS, filter
    )
}

struct RecordRow(TenantRecord);

impl FromMssqlRow for RecordRow {
    fn from_row(row: &Row) -> Result<Self, MssqlError> {
        Ok(Self(TenantRecord {
            id: row.get_value::<i64>("id")?,
            guid: row.get_value::<&str>("guid")?.to_string(),
            domain: row.get_opt::<&str>("domain")?.unwrap_or_default().to_string(),
            inactive: row.get_value::<bool>("inactive")?,
        }))
    }
}

/// Decrypted credential row. `None` credentials mean the decryption failed.
struct CredentialRow {
    instance: Option<String>,
    database: Option<String>,
    user: Option<SecretString>,
    pass: Option<SecretString>,
}

impl FromMssqlRow for CredentialRow {
    fn from_row(row: &Row) -> Result<Self, MssqlError> {
        let text = |column: &str| -> Result<Option<String>, MssqlError> {
            Ok(row
                .get_opt::<&str>(column)?
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string))
        };
        Ok(Self {
            instance: text("instance")?,
            database: text("database")?,
            user: text("user")?.map(|v| SecretString::new(v.into())),
            pass: text("pass")?.map(|v| SecretString::new(v.into())),
        })
    }
}

impl CredentialRow {
    fn into_config(
        self,
        tenant: &TenantId,
        defaults: &ConnectionDefaults,
    ) -> TenantResult<ConnectionConfig> {
        let (Some(user), Some(pass)) = (self.user, self.pass) else {
            return Err(TenantError::credential_resolution(
                tenant,
                "stored credentials could not be decrypted",
            ));
        };
        let Some(instance) = self.instance else {
            return Err(TenantError::credential_resolution(
                tenant,
                "tenant database has no server address",
            ));
        };
        let Some(database) = self.database else {
            return Err(TenantError::credential_resolution(
                tenant,
                "tenant database has no database name",
            ));
        };
        let address = ServerAddress::parse(&instance).map_err(|e| {
            TenantError::credential_resolution(tenant, e.message.clone()).with_source(e)
        })?;
        Ok(ConnectionConfig::new(&address, database, user, pass, defaults))
    }
}

/// [`CredentialStore`] reading the control-plane database.
pub struct ControlPlaneStore {
    pool: Arc<MssqlPool>,
    passphrase: Option<SecretString>,
    defaults: ConnectionDefaults,
    lookup_timeout: Duration,
}

impl std::fmt::Debug for ControlPlaneStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlPlaneStore")
            .field("pool", &self.pool)
            .field("passphrase_configured", &self.passphrase.is_some())
            .field("lookup_timeout", &self.lookup_timeout)
            .finish()
    }
}

impl ControlPlaneStore {
    /// Create a store over an existing control-plane pool.
    ///
    /// Without a passphrase the store still answers status queries, but every
    /// credential lookup fails with a missing-configuration error.
    pub fn new(
        pool: Arc<MssqlPool>,
        passphrase: Option<SecretString>,
        defaults: ConnectionDefaults,
        lookup_timeout: Duration,
    ) -> Self {
        let passphrase = passphrase.filter(|p| !p.expose_secret().is_empty());
        if passphrase.is_none() {
            error!(
                setting = vars::PASSPHRASE,
                "credential passphrase is not configured, tenant lookups will fail"
            );
        }
        Self {
            pool,
            passphrase,
            defaults,
            lookup_timeout,
        }
    }

    /// Open the control-plane pool described by `config` and wrap it.
    pub async fn connect(config: &TenancyConfig) -> TenantResult<Self> {
        let cp = &config.control_plane;
        let url = cp
            .url
            .as_deref()
            .ok_or_else(|| TenantError::missing_config(vars::CONTROL_PLANE_URL))?;
        let mssql = MssqlConfig::from_connection_string(url)?;
        let pool_config = PoolConfig::default()
            .with_max_connections(cp.pool_size)
            .with_connection_timeout(config.connection.connect_timeout());
        let pool = MssqlPool::with_pool_config(mssql, pool_config)
            .await
            .map_err(|e| TenantError::control_plane("failed to open the control-plane pool").with_source(e))?;
        Ok(Self::new(
            Arc::new(pool),
            cp.passphrase.clone(),
            config.connection.clone(),
            cp.lookup_timeout(),
        ))
    }

    /// The control-plane pool.
    pub fn pool(&self) -> &Arc<MssqlPool> {
        &self.pool
    }

    /// Whether credential lookups can succeed.
    pub fn has_passphrase(&self) -> bool {
        self.passphrase.is_some()
    }

    async fn fetch<T: FromMssqlRow>(
        &self,
        tenant: &TenantId,
        sql: &str,
        params: &[&dyn ToSql],
    ) -> TenantResult<Option<T>> {
        let query = async {
            let mut conn = self.pool.get().await?;
            conn.query_opt(sql, params).await
        };
        let row = match timeout(self.lookup_timeout, query).await {
            Ok(Ok(row)) => row,
            Ok(Err(e)) => return Err(unavailable(e).with_tenant(tenant)),
            Err(_) => {
                return Err(
                    TenantError::timeout("control-plane lookup", self.lookup_timeout)
                        .with_tenant(tenant),
                );
            }
        };
        row.map(|r| T::from_row(&r))
            .transpose()
            .map_err(|e| TenantError::internal("unexpected control-plane row shape").with_source(e).with_tenant(tenant))
    }

    /// Read the tenant record.
    pub async fn record(&self, tenant: &TenantId) -> TenantResult<TenantRecord> {
        if !is_lookup_value(tenant) {
            return Err(TenantError::unknown_tenant(tenant));
        }
        let value = tenant.as_str();
        let sql = record_query(tenant.kind());
        self.fetch::<RecordRow>(tenant, &sql, &[&value])
            .await?
            .map(|RecordRow(record)| record)
            .ok_or_else(|| TenantError::unknown_tenant(tenant))
    }
}

fn unavailable(err: MssqlError) -> TenantError {
    if err.is_timeout() {
        TenantError::new(ErrorCode::Timeout, err.to_string()).with_source(err)
    } else {
        TenantError::control_plane(err.to_string()).with_source(err)
    }
}

// A GUID that does not parse can never match.
fn is_lookup_value(tenant: &TenantId) -> bool {
    match tenant.kind() {
        IdentifierKind::DatabaseGuid => uuid::Uuid::parse_str(tenant.as_str()).is_ok(),
        _ => !tenant.is_empty(),
    }
}

#[async_trait]
impl CredentialStore for ControlPlaneStore {
    async fn resolve(&self, tenant: &TenantId) -> TenantResult<ConnectionConfig> {
        let Some(passphrase) = self.passphrase.as_ref() else {
            return Err(TenantError::missing_config(vars::PASSPHRASE).with_tenant(tenant));
        };

        let record = self.record(tenant).await?;
        if record.inactive {
            warn!(tenant = %tenant, company = record.id, "tenant is inactive");
            return Err(TenantError::inactive_tenant(tenant));
        }

        let sql = credential_query(tenant.kind());
        let secret = passphrase.expose_secret();
        let value = tenant.as_str();
        let row = self
            .fetch::<CredentialRow>(tenant, &sql, &[&secret, &value])
            .await?
            .ok_or_else(|| TenantError::unknown_tenant(tenant))?;
        let config = row.into_config(tenant, &self.defaults)?;
        debug!(
            tenant = %tenant,
            server = %config.server,
            database = %config.database,
            "resolved tenant credentials"
        );
        Ok(config)
    }

    async fn status(&self, tenant: &TenantId) -> TenantResult<TenantStatus> {
        Ok(self.record(tenant).await?.status())
    }
}
