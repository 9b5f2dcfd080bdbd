//! # tenantry-core
//!
//! Request-scoped tenant routing for services that keep one database per
//! customer.
//!
//! This crate provides:
//! - Tenant identification from request metadata (header, cookie, query, host)
//! - A single-flight cache of per-tenant connection handles
//! - A task-local request context that follows the request through `.await`
//! - A [`ConnectionProvider`] that hands tenant-unaware code the right connection
//! - Bypass rules for shared routes that never touch a tenant store
//!
//! ## Resolving a tenant
//!
//! ```rust,ignore
//! use tenantry_core::{RequestMetadata, StaticCredentialStore, TenantResolver};
//!
//! let resolver = TenantResolver::builder()
//!     .store(StaticCredentialStore::new())
//!     .factory(my_factory)
//!     .build()?;
//!
//! let meta = RequestMetadata::new("GET", "/api/orders").with_authority("acme.example.com");
//! let resolved = resolver.resolve(&meta).await?;
//! assert_eq!(resolved.tenant.as_str(), "acme");
//! ```
//!
//! ## Request context
//!
//! ```rust
//! use tenantry_core::{context, RequestMetadata};
//!
//! # tokio_test::block_on(async {
//! let path = context::run(RequestMetadata::new("GET", "/health"), async {
//!     context::with_current(|ctx| ctx.metadata.path().to_string())
//! })
//! .await;
//! assert_eq!(path.as_deref(), Some("/health"));
//! assert!(!context::in_scope());
//! # });
//! ```

#![warn(missing_docs)]

pub mod bypass;
pub mod cache;
pub mod config;
pub mod context;
pub mod credentials;
pub mod env;
pub mod error;
pub mod handle;
pub mod id;
pub mod logging;
pub mod metadata;
pub mod provider;
pub mod resolver;

pub use bypass::{BypassRule, BypassRules};
pub use cache::{CacheConfig, CacheStats, CachedTenant, ConnectionCache, StaleHandlePolicy};
pub use config::{
    BypassSection, CacheSection, ControlPlaneConfig, ResolutionConfig, StalePolicySetting,
    TenancyConfig,
};
pub use context::{Identity, RequestContext, RequestScope};
pub use credentials::{
    ConnectionConfig, ConnectionDefaults, CredentialStore, ServerAddress, StaticCredentialStore,
    TenantRecord, TenantStatus,
};
pub use env::{EnvSource, MapEnvSource, StdEnvSource};
pub use error::{ErrorClass, ErrorCode, TenantError, TenantResult};
pub use handle::{ConnectionFactory, ConnectionHandle, TenantConnection};
pub use id::{IdentifierKind, TenantId};
pub use logging::init as init_logging;
pub use metadata::RequestMetadata;
pub use provider::ConnectionProvider;
pub use resolver::{
    Identification, IdentifierSource, ResolvedTenant, TenantResolver, TenantResolverBuilder,
};

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::context;
    pub use crate::error::{TenantError, TenantResult};
    pub use crate::handle::{ConnectionFactory, ConnectionHandle, TenantConnection};
    pub use crate::id::{IdentifierKind, TenantId};
    pub use crate::metadata::RequestMetadata;
    pub use crate::provider::ConnectionProvider;
    pub use crate::resolver::{ResolvedTenant, TenantResolver};
}
