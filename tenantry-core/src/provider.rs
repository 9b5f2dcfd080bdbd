//! The "give me the connection" indirection.
//!
//! Tenant-unaware code asks a [`ConnectionProvider`] for its connection. Inside
//! a request scope that carries a ready tenant connection, that connection is
//! returned; everywhere else (startup, scheduled jobs, bypassed requests) the
//! process-wide default connection is.
//!
//! Prefer passing the provider explicitly (it is cheap to clone). Call sites
//! that cannot take a parameter can use the process-wide slot managed by
//! [`install`] and [`uninstall`].

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::context;
use crate::error::{ErrorCode, TenantError, TenantResult};
use crate::handle::ConnectionHandle;

static INSTALLED: RwLock<Option<ConnectionProvider>> = parking_lot::const_rwlock(None);

/// Chooses between the request's connection and the default connection.
#[derive(Clone)]
pub struct ConnectionProvider {
    default: ConnectionHandle,
}

impl std::fmt::Debug for ConnectionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionProvider")
            .field("default_database", &self.default.database())
            .field("default_ready", &self.default.is_ready())
            .finish()
    }
}

impl ConnectionProvider {
    /// Create a provider around the default connection.
    ///
    /// Fails when the default connection is not ready, so a misconfigured
    /// process stops at startup instead of serving requests.
    pub fn new(default: ConnectionHandle) -> TenantResult<Self> {
        if !default.is_ready() {
            return Err(TenantError::missing_context(format!(
                "default connection to '{}' is not ready",
                default.database()
            )));
        }
        Ok(Self { default })
    }

    /// The process-wide default connection.
    pub fn default_connection(&self) -> &ConnectionHandle {
        &self.default
    }

    /// The request's ready connection, else the default connection.
    ///
    /// Never returns a handle that reports not ready.
    pub fn connection(&self) -> TenantResult<ConnectionHandle> {
        if let Some(handle) = context::current_connection() {
            if handle.is_ready() {
                return Ok(handle);
            }
            debug!(
                database = handle.database(),
                "request connection not ready, using default connection"
            );
        }
        if self.default.is_ready() {
            Ok(self.default.clone())
        } else {
            Err(TenantError::connection(format!(
                "default connection to '{}' is closed",
                self.default.database()
            )))
        }
    }

    /// Whether the next [`connection`](Self::connection) call would come from
    /// the request scope.
    pub fn is_tenant_scoped(&self) -> bool {
        context::current_connection().is_some_and(|h| h.is_ready())
    }
}

/// Install a provider for the whole process.
///
/// Fails if one is already installed.
pub fn install(provider: ConnectionProvider) -> TenantResult<()> {
    let mut slot = INSTALLED.write();
    if slot.is_some() {
        return Err(TenantError::new(
            ErrorCode::AlreadyInstalled,
            "a connection provider is already installed",
        ));
    }
    info!(database = provider.default.database(), "connection provider installed");
    *slot = Some(provider);
    Ok(())
}

/// Remove the process-wide provider, returning it.
pub fn uninstall() -> Option<ConnectionProvider> {
    let removed = INSTALLED.write().take();
    if removed.is_some() {
        info!("connection provider uninstalled");
    }
    removed
}

/// Whether a process-wide provider is installed.
pub fn is_installed() -> bool {
    INSTALLED.read().is_some()
}

/// The process-wide provider.
pub fn installed() -> TenantResult<ConnectionProvider> {
    INSTALLED
        .read()
        .clone()
        .ok_or_else(|| TenantError::missing_context("no connection provider is installed"))
}

/// Connection from the process-wide provider.
pub fn connection() -> TenantResult<ConnectionHandle> {
    installed()?.connection()
}
