//! Error types for tenant resolution with stable, classified codes.
//!
//! Every failure carries an [`ErrorCode`] and maps onto one [`ErrorClass`],
//! which is what the request boundary uses to pick a response. Codes follow
//! the pattern `T{category}{number}`:
//! - 1xxx: tenant lookup (not found, inactive)
//! - 2xxx: credential resolution
//! - 3xxx: infrastructure (connection, control plane, timeouts)
//! - 4xxx: configuration
//! - 5xxx: context and installation
//! - 9xxx: internal
//!
//! ```rust
//! use tenantry_core::{ErrorClass, ErrorCode, TenantError, TenantId};
//!
//! let err = TenantError::unknown_tenant(&TenantId::domain("acme"));
//! assert_eq!(err.code, ErrorCode::UnknownTenant);
//! assert_eq!(err.class(), ErrorClass::UnknownTenant);
//! assert!(err.to_string().starts_with("[T1001]"));
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::id::TenantId;

/// Result type for tenant operations.
pub type TenantResult<T> = Result<T, TenantError>;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Tenant lookup (1xxx)
    /// No tenant matches the identifier (T1001).
    UnknownTenant = 1001,
    /// The tenant exists but is marked inactive (T1002).
    InactiveTenant = 1002,

    // Credentials (2xxx)
    /// Credentials could not be decrypted or the record is malformed (T2001).
    CredentialResolution = 2001,

    // Infrastructure (3xxx)
    /// The tenant backend could not be reached or rejected the login (T3001).
    ConnectionFailed = 3001,
    /// The control-plane store could not be queried (T3002).
    ControlPlaneUnavailable = 3002,
    /// A lookup or connection attempt exceeded its deadline (T3003).
    Timeout = 3003,

    // Configuration (4xxx)
    /// A required setting is absent (T4001).
    MissingConfiguration = 4001,
    /// A setting has an unusable value (T4002).
    InvalidConfiguration = 4002,

    // Context (5xxx)
    /// No request context or provider is available (T5001).
    MissingContext = 5001,
    /// A process-wide provider is already installed (T5002).
    AlreadyInstalled = 5002,

    /// Internal error (T9001).
    Internal = 9001,
}

impl ErrorCode {
    /// Get the error code string (e.g., "T1001").
    pub fn code(&self) -> String {
        format!("T{}", *self as u16)
    }

    /// Get a short description of the error code.
    pub fn description(&self) -> &'static str {
        match self {
            Self::UnknownTenant => "Unknown tenant",
            Self::InactiveTenant => "Inactive tenant",
            Self::CredentialResolution => "Credential resolution failed",
            Self::ConnectionFailed => "Tenant connection failed",
            Self::ControlPlaneUnavailable => "Control plane unavailable",
            Self::Timeout => "Operation timed out",
            Self::MissingConfiguration => "Missing configuration",
            Self::InvalidConfiguration => "Invalid configuration",
            Self::MissingContext => "Missing connection context",
            Self::AlreadyInstalled => "Provider already installed",
            Self::Internal => "Internal error",
        }
    }

    /// The response classification this code belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::UnknownTenant => ErrorClass::UnknownTenant,
            Self::InactiveTenant => ErrorClass::InactiveTenant,
            Self::CredentialResolution
            | Self::ConnectionFailed
            | Self::ControlPlaneUnavailable
            | Self::Timeout => ErrorClass::Infrastructure,
            Self::MissingConfiguration
            | Self::InvalidConfiguration
            | Self::MissingContext
            | Self::AlreadyInstalled
            | Self::Internal => ErrorClass::Configuration,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Stable classification used to shape responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// No matching tenant record; access denied.
    UnknownTenant,
    /// Tenant exists but is disabled; access denied with a distinct reason.
    InactiveTenant,
    /// Credential, backend or control-plane failure; retry later.
    Infrastructure,
    /// The process is not set up to serve tenant requests.
    Configuration,
}

impl ErrorClass {
    /// Machine-readable name, stable across releases.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnknownTenant => "unknown_tenant",
            Self::InactiveTenant => "inactive_tenant",
            Self::Infrastructure => "tenant_unavailable",
            Self::Configuration => "configuration_error",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised while identifying a tenant or producing its connection.
///
/// Cloneable so that one failed single-flight initialisation can be delivered
/// to every waiter.
#[derive(Error, Debug, Clone)]
pub struct TenantError {
    /// The error code.
    pub code: ErrorCode,
    /// The error message. May contain operator detail; see [`public_message`](Self::public_message).
    pub message: String,
    /// The tenant involved, when known.
    pub tenant: Option<TenantId>,
    /// The source error (if any).
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for TenantError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code.code(), self.message)
    }
}

impl TenantError {
    /// Create a new error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            tenant: None,
            source: None,
        }
    }

    /// Attach the tenant the error concerns.
    pub fn with_tenant(mut self, tenant: &TenantId) -> Self {
        self.tenant = Some(tenant.clone());
        self
    }

    /// Set the source error.
    pub fn with_source<E: std::error::Error + Send + Sync + 'static>(mut self, source: E) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    // ============== Constructor Functions ==============

    /// No tenant record matches the identifier.
    pub fn unknown_tenant(tenant: &TenantId) -> Self {
        Self::new(ErrorCode::UnknownTenant, format!("No tenant found for '{}'", tenant))
            .with_tenant(tenant)
    }

    /// The tenant record is marked inactive.
    pub fn inactive_tenant(tenant: &TenantId) -> Self {
        Self::new(ErrorCode::InactiveTenant, format!("Tenant '{}' is inactive", tenant))
            .with_tenant(tenant)
    }

    /// The credential row could not be decrypted or is incomplete.
    pub fn credential_resolution(tenant: &TenantId, message: impl Into<String>) -> Self {
        Self::new(ErrorCode::CredentialResolution, message).with_tenant(tenant)
    }

    /// Opening or validating the tenant's backend failed.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConnectionFailed, message)
    }

    /// The control-plane store could not be queried.
    pub fn control_plane(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ControlPlaneUnavailable, message)
    }

    /// A bounded wait expired.
    pub fn timeout(operation: &str, after: Duration) -> Self {
        Self::new(
            ErrorCode::Timeout,
            format!("{} timed out after {}ms", operation, after.as_millis()),
        )
    }

    /// A required setting is absent.
    pub fn missing_config(setting: &str) -> Self {
        Self::new(
            ErrorCode::MissingConfiguration,
            format!("Required setting '{}' is not configured", setting),
        )
    }

    /// A setting has an unusable value.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidConfiguration, message)
    }

    /// Neither a request context nor a provider could supply a connection.
    pub fn missing_context(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::MissingContext, message)
    }

    /// Internal invariant violation.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    // ============== Error Predicates ==============

    /// The response classification of this error.
    pub fn class(&self) -> ErrorClass {
        self.code.class()
    }

    /// Check if this is an unknown-tenant error.
    pub fn is_unknown_tenant(&self) -> bool {
        self.code == ErrorCode::UnknownTenant
    }

    /// Check if this is an inactive-tenant error.
    pub fn is_inactive_tenant(&self) -> bool {
        self.code == ErrorCode::InactiveTenant
    }

    /// Check if this is a timeout error.
    pub fn is_timeout(&self) -> bool {
        self.code == ErrorCode::Timeout
    }

    /// Whether the caller may reasonably retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::ConnectionFailed | ErrorCode::ControlPlaneUnavailable | ErrorCode::Timeout
        )
    }

    /// Text safe to show to end users. Never includes decryption, server or
    /// credential detail.
    pub fn public_message(&self) -> &'static str {
        match self.class() {
            ErrorClass::UnknownTenant => "The requested tenant does not exist.",
            ErrorClass::InactiveTenant => "The requested tenant is inactive.",
            ErrorClass::Infrastructure => {
                "The tenant's database is temporarily unavailable. Please retry later."
            }
            ErrorClass::Configuration => "The server is not configured to serve this request.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_format() {
        assert_eq!(ErrorCode::UnknownTenant.code(), "T1001");
        assert_eq!(ErrorCode::CredentialResolution.code(), "T2001");
        assert_eq!(ErrorCode::Timeout.code(), "T3003");
    }

    #[test]
    fn test_classification() {
        let id = TenantId::domain("acme");
        assert_eq!(TenantError::unknown_tenant(&id).class(), ErrorClass::UnknownTenant);
        assert_eq!(TenantError::inactive_tenant(&id).class(), ErrorClass::InactiveTenant);
        assert_eq!(
            TenantError::credential_resolution(&id, "bad").class(),
            ErrorClass::Infrastructure
        );
        assert_eq!(TenantError::control_plane("down").class(), ErrorClass::Infrastructure);
        assert_eq!(TenantError::missing_config("passphrase").class(), ErrorClass::Configuration);
    }

    #[test]
    fn test_retryable() {
        assert!(TenantError::connection("refused").is_retryable());
        assert!(TenantError::timeout("lookup", Duration::from_millis(50)).is_retryable());
        assert!(!TenantError::credential_resolution(&TenantId::domain("a"), "x").is_retryable());
        assert!(!TenantError::unknown_tenant(&TenantId::domain("a")).is_retryable());
    }

    #[test]
    fn test_public_message_hides_detail() {
        let err = TenantError::credential_resolution(
            &TenantId::domain("acme"),
            "DecryptByPassphrase returned NULL for user column",
        );
        assert!(!err.public_message().contains("Decrypt"));
        assert!(err.to_string().contains("DecryptByPassphrase"));
    }

    #[test]
    fn test_tenant_attached() {
        let err = TenantError::inactive_tenant(&TenantId::database("globalcorp"));
        assert_eq!(err.tenant, Some(TenantId::database("globalcorp")));
        assert!(err.message.contains("globalcorp"));
    }

    #[test]
    fn test_clone_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err = TenantError::connection("backend unreachable").with_source(io);
        let copy = err.clone();
        assert!(std::error::Error::source(&copy).is_some());
    }
}
