//! Request-scoped context carried in task-local storage.
//!
//! [`run`] is the only way to open a scope. Everything awaited inside the
//! scope's future sees the same [`RequestContext`] through [`current`] and the
//! accessor functions; code in another scope, or outside any scope, never does.
//!
//! # Example
//!
//! ```rust
//! use tenantry_core::context;
//! use tenantry_core::{RequestMetadata, TenantId};
//!
//! # tokio_test::block_on(async {
//! let meta = RequestMetadata::new("GET", "/rest/workflows");
//! let tenant = context::run(meta, async {
//!     context::update(|ctx| ctx.tenant = Some(TenantId::domain("acme")));
//!     context::current_tenant()
//! })
//! .await;
//!
//! assert_eq!(tenant, Some(TenantId::domain("acme")));
//! assert!(context::current().is_none());
//! # });
//! ```
//!
//! Tasks started with `tokio::spawn` begin outside any scope. Carry the scope
//! explicitly when a spawned task belongs to the request:
//!
//! ```rust,ignore
//! let scope = RequestScope::current().expect("inside a request");
//! tokio::spawn(scope.enter(async move { audit_log().await }));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::handle::ConnectionHandle;
use crate::id::TenantId;
use crate::metadata::RequestMetadata;

tokio::task_local! {
    /// Task-local request scope.
    static CURRENT: RequestScope;
}

/// Verified identity produced by the authentication layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Identity {
    /// Stable subject identifier.
    pub subject: String,
    /// Email address, when known.
    #[serde(default)]
    pub email: Option<String>,
    /// Human readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Remaining verified claims.
    #[serde(default)]
    pub claims: HashMap<String, serde_json::Value>,
}

impl Identity {
    /// Create an identity for a subject.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Set the email.
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Add a claim.
    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.claims.insert(key.into(), value.into());
        self
    }
}

/// Data owned by one in-flight request.
#[derive(Clone)]
pub struct RequestContext {
    /// The request metadata the scope was opened with.
    pub metadata: Arc<RequestMetadata>,
    /// The resolved tenant.
    pub tenant: Option<TenantId>,
    /// The tenant's connection.
    pub connection: Option<ConnectionHandle>,
    /// The authenticated caller.
    pub identity: Option<Identity>,
}

impl RequestContext {
    fn new(metadata: RequestMetadata) -> Self {
        Self {
            metadata: Arc::new(metadata),
            tenant: None,
            connection: None,
            identity: None,
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("method", &self.metadata.method())
            .field("path", &self.metadata.path())
            .field("tenant", &self.tenant)
            .field("connection", &self.connection.as_ref().map(|c| c.database().to_string()))
            .field("identity", &self.identity.as_ref().map(|i| &i.subject))
            .finish()
    }
}

/// Handle to one request's context cell.
#[derive(Clone)]
pub struct RequestScope {
    inner: Arc<RwLock<RequestContext>>,
}

impl RequestScope {
    fn new(metadata: RequestMetadata) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RequestContext::new(metadata))),
        }
    }

    /// The scope the calling task is running in.
    pub fn current() -> Option<Self> {
        CURRENT.try_with(|scope| scope.clone()).ok()
    }

    /// Run a future inside this existing scope, for work spawned on behalf of
    /// the request.
    pub async fn enter<F: Future>(self, f: F) -> F::Output {
        CURRENT.scope(self, f).await
    }

    /// Run a closure inside this scope on the current thread.
    pub fn sync_enter<R>(self, f: impl FnOnce() -> R) -> R {
        CURRENT.sync_scope(self, f)
    }

    /// Copy of the context data.
    pub fn snapshot(&self) -> RequestContext {
        self.inner.read().clone()
    }
}

impl fmt::Debug for RequestScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("RequestScope").field(&*self.inner.read()).finish()
    }
}

/// Run `f` in a new, isolated request scope.
///
/// Nesting opens an inner scope that ends with the inner future; the outer
/// scope is visible again afterwards.
pub async fn run<F: Future>(metadata: RequestMetadata, f: F) -> F::Output {
    CURRENT.scope(RequestScope::new(metadata), f).await
}

/// Snapshot of the active context, or `None` outside a scope.
pub fn current() -> Option<RequestContext> {
    with_current(RequestContext::clone)
}

/// Borrow the active context.
///
/// `f` runs under the scope's read lock and must not call [`update`].
pub fn with_current<F, T>(f: F) -> Option<T>
where
    F: FnOnce(&RequestContext) -> T,
{
    CURRENT.try_with(|scope| f(&scope.inner.read())).ok()
}

/// Whether the caller runs inside a request scope.
pub fn in_scope() -> bool {
    CURRENT.try_with(|_| ()).is_ok()
}

/// Mutate the active context. Returns false outside a scope.
pub fn update<F>(f: F) -> bool
where
    F: FnOnce(&mut RequestContext),
{
    CURRENT.try_with(|scope| f(&mut scope.inner.write())).is_ok()
}

/// Record the resolved tenant and its connection in the active scope.
pub fn attach_tenant(tenant: TenantId, connection: ConnectionHandle) -> bool {
    update(|ctx| {
        ctx.tenant = Some(tenant);
        ctx.connection = Some(connection);
    })
}

/// Record the authenticated identity in the active scope.
pub fn set_identity(identity: Identity) -> bool {
    update(|ctx| ctx.identity = Some(identity))
}

/// The active scope's tenant.
pub fn current_tenant() -> Option<TenantId> {
    with_current(|ctx| ctx.tenant.clone()).flatten()
}

/// The active scope's connection.
pub fn current_connection() -> Option<ConnectionHandle> {
    with_current(|ctx| ctx.connection.clone()).flatten()
}

/// The active scope's identity.
pub fn current_identity() -> Option<Identity> {
    with_current(|ctx| ctx.identity.clone()).flatten()
}
