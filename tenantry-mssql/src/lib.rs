//! # tenantry-mssql
//!
//! Microsoft SQL Server backend for tenantry.
//!
//! This crate provides:
//! - Connection pool management using `bb8` and `tiberius`
//! - [`MssqlPool`] as a tenant [`ConnectionHandle`](tenantry_core::ConnectionHandle)
//! - [`MssqlConnectionFactory`], which opens and validates one pool per tenant
//! - [`ControlPlaneStore`], the credential store over the control-plane database
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tenantry_core::{TenancyConfig, TenantResolver};
//! use tenantry_mssql::{ControlPlaneStore, MssqlConnectionFactory};
//!
//! let config = TenancyConfig::from_env()?;
//! let store = ControlPlaneStore::connect(&config).await?;
//! let resolver = TenantResolver::from_config(
//!     &config,
//!     Arc::new(store),
//!     Arc::new(MssqlConnectionFactory::new()),
//! );
//! ```

pub mod config;
pub mod connection;
pub mod control_plane;
pub mod error;
pub mod factory;
pub mod pool;
pub mod row;

pub use config::{EncryptionMode, MssqlConfig, MssqlConfigBuilder};
pub use connection::MssqlConnection;
pub use control_plane::ControlPlaneStore;
pub use error::{MssqlError, MssqlResult};
pub use factory::MssqlConnectionFactory;
pub use pool::{MssqlPool, MssqlPoolBuilder, PoolConfig, PoolStatus};
pub use row::{FromMssqlRow, MssqlRow};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::MssqlConfig;
    pub use crate::connection::MssqlConnection;
    pub use crate::control_plane::ControlPlaneStore;
    pub use crate::error::{MssqlError, MssqlResult};
    pub use crate::factory::MssqlConnectionFactory;
    pub use crate::pool::{MssqlPool, MssqlPoolBuilder};
}
