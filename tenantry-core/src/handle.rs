//! Connection handle and factory seams.
//!
//! The core never talks to a database driver directly. A backend provides a
//! [`TenantConnection`] (usually a pool) and a [`ConnectionFactory`] that
//! builds one from a [`ConnectionConfig`].

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::credentials::ConnectionConfig;
use crate::error::TenantResult;

/// A live, poolable connection to one tenant store.
#[async_trait]
pub trait TenantConnection: Send + Sync + 'static {
    /// Whether the handle can serve queries.
    fn is_ready(&self) -> bool;

    /// Name of the database the handle is bound to.
    fn database(&self) -> &str;

    /// Release the underlying resources. Idempotent.
    ///
    /// Only the connection cache (or process shutdown) calls this.
    async fn close(&self);

    /// Access the concrete type, see [`downcast`].
    fn as_any(&self) -> &dyn Any;
}

/// Shared reference to a tenant connection.
pub type ConnectionHandle = Arc<dyn TenantConnection>;

/// Recover the concrete backend type of a handle.
pub fn downcast<T: TenantConnection>(handle: &ConnectionHandle) -> Option<&T> {
    handle.as_any().downcast_ref::<T>()
}

/// Builds and initialises connection handles.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Open a handle for the given configuration and verify it is usable.
    async fn connect(&self, config: ConnectionConfig) -> TenantResult<ConnectionHandle>;
}

#[async_trait]
impl<F: ConnectionFactory + ?Sized> ConnectionFactory for Arc<F> {
    async fn connect(&self, config: ConnectionConfig) -> TenantResult<ConnectionHandle> {
        (**self).connect(config).await
    }
}
