//! Axum integration for tenantry.
//!
//! # Features
//!
//! - **Middleware**: [`TenantLayer`] opens a request context for every request,
//!   applies bypass rules, resolves the tenant and attaches its connection
//! - **Extractors**: [`CurrentTenant`] and [`TenantConnectionHandle`]
//! - **Responses**: tenant failures become stable `403`/`503`/`500` JSON bodies
//! - **Administration**: [`admin::router`] inspects and clears the cache
//!
//! # Example
//!
//! ```rust,ignore
//! use axum::{Router, routing::get};
//! use tenantry_axum::{CurrentTenant, TenantLayer};
//!
//! async fn whoami(tenant: CurrentTenant) -> String {
//!     tenant.id().to_string()
//! }
//!
//! let app = Router::new()
//!     .route("/rest/whoami", get(whoami))
//!     .layer(TenantLayer::from_config(&config, resolver));
//! ```

pub mod admin;
pub mod error;
pub mod extract;
pub mod layer;

pub use error::{ErrorBody, RETRY_AFTER_SECS, TenantRejection, status_for};
pub use extract::{CurrentTenant, TenantConnectionHandle};
pub use layer::{TenantLayer, TenantMiddleware, metadata_from_parts};

/// Prelude for convenient imports.
pub mod prelude {
    pub use super::{CurrentTenant, TenantConnectionHandle, TenantLayer, TenantRejection};
    pub use tenantry_core::prelude::*;
}
