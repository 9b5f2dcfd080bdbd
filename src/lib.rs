//! # Tenantry
//!
//! Request-scoped tenant routing for services that keep one SQL Server
//! database per customer.
//!
//! Tenantry provides:
//! - Tenant identification from the request host, header, cookie or query
//! - A single-flight cache of per-tenant connection pools
//! - A task-local request context that follows the request through `.await`
//! - A connection provider that gives tenant-unaware code the right connection
//! - A control-plane credential store with server-side decryption
//! - An Axum layer with stable error responses and cache administration
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use axum::{Router, routing::get};
//! use tenantry::prelude::*;
//! use tenantry::mssql::{ControlPlaneStore, MssqlConnectionFactory};
//! use tenantry::axum::TenantLayer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     tenantry::init_logging();
//!
//!     let config = TenancyConfig::load("tenantry.toml")?.with_env(&StdEnvSource)?;
//!     config.validate()?;
//!
//!     let store = ControlPlaneStore::connect(&config).await?;
//!     let default = store.pool().clone();
//!     tenantry::provider::install(ConnectionProvider::new(default)?)?;
//!
//!     let resolver = TenantResolver::from_config(
//!         &config,
//!         Arc::new(store),
//!         Arc::new(MssqlConnectionFactory::new()),
//!     );
//!     let app = Router::new()
//!         .route("/rest/workflows", get(list_workflows))
//!         .layer(TenantLayer::from_config(&config, resolver));
//!
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:5678").await?;
//!     axum::serve(listener, app).await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub use tenantry_core::*;

/// SQL Server backend.
#[cfg(feature = "mssql")]
#[cfg_attr(docsrs, doc(cfg(feature = "mssql")))]
pub mod mssql {
    pub use tenantry_mssql::*;
}

/// Axum integration.
#[cfg(feature = "axum")]
#[cfg_attr(docsrs, doc(cfg(feature = "axum")))]
pub mod axum {
    pub use tenantry_axum::*;
}

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tenantry_core::prelude::*;
    pub use tenantry_core::{
        BypassRules, ConnectionCache, StaticCredentialStore, StdEnvSource, TenancyConfig,
    };

    #[cfg(feature = "axum")]
    pub use tenantry_axum::{CurrentTenant, TenantConnectionHandle, TenantLayer};
    #[cfg(feature = "mssql")]
    pub use tenantry_mssql::{ControlPlaneStore, MssqlConnectionFactory, MssqlPool};
}
