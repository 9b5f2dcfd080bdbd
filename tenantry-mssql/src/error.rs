//! Error types for Microsoft SQL Server operations.

use tenantry_core::{ErrorCode, TenantError};
use thiserror::Error;

/// Result type for MSSQL operations.
pub type MssqlResult<T> = Result<T, MssqlError>;

/// Errors that can occur during MSSQL operations.
#[derive(Error, Debug)]
pub enum MssqlError {
    /// Connection pool error.
    #[error("pool error: {0}")]
    Pool(String),

    /// Tiberius/SQL Server error.
    #[error("sql server error: {0}")]
    SqlServer(#[from] tiberius::error::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection error.
    #[error("connection error: {0}")]
    Connection(String),

    /// The pool was closed.
    #[error("pool for database '{0}' is closed")]
    Closed(String),

    /// Query execution error.
    #[error("query error: {0}")]
    Query(String),

    /// Row deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// An operation exceeded its deadline, in milliseconds.
    #[error("operation timed out after {0}ms")]
    Timeout(u64),

    /// No pooled connection became available in time.
    #[error("timed out waiting for a pooled connection")]
    CheckoutTimeout,
}

impl MssqlError {
    /// Create a pool error.
    pub fn pool(message: impl Into<String>) -> Self {
        Self::Pool(message.into())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a query error.
    pub fn query(message: impl Into<String>) -> Self {
        Self::Query(message.into())
    }

    /// Create a deserialization error.
    pub fn deserialization(message: impl Into<String>) -> Self {
        Self::Deserialization(message.into())
    }

    /// Check if this is a connection error.
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::Connection(_) | Self::Closed(_))
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::CheckoutTimeout)
    }
}

impl<E> From<bb8::RunError<E>> for MssqlError
where
    E: std::error::Error,
{
    fn from(err: bb8::RunError<E>) -> Self {
        match err {
            bb8::RunError::User(e) => MssqlError::Pool(e.to_string()),
            bb8::RunError::TimedOut => MssqlError::CheckoutTimeout,
        }
    }
}

impl From<MssqlError> for TenantError {
    fn from(err: MssqlError) -> Self {
        let code = match &err {
            MssqlError::Pool(_) | MssqlError::Connection(_) | MssqlError::Closed(_) => {
                ErrorCode::ConnectionFailed
            }
            MssqlError::SqlServer(_) | MssqlError::Query(_) => ErrorCode::ConnectionFailed,
            MssqlError::Config(_) => ErrorCode::InvalidConfiguration,
            MssqlError::Deserialization(_) => ErrorCode::Internal,
            MssqlError::Timeout(_) | MssqlError::CheckoutTimeout => ErrorCode::Timeout,
        };
        TenantError::new(code, err.to_string()).with_source(err)
    }
}
