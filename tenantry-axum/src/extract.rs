//! Handler extractors.

use axum::extract::FromRequestParts;
use http::request::Parts;
use tenantry_core::{
    ConnectionHandle, IdentifierSource, ResolvedTenant, TenantError, TenantId, provider,
};

use crate::error::TenantRejection;

/// The tenant resolved for this request.
///
/// Rejects with a configuration error when [`TenantLayer`](crate::TenantLayer)
/// is not installed or the route is bypassed.
///
/// ```rust,ignore
/// async fn whoami(CurrentTenant(tenant): CurrentTenant) -> String {
///     tenant.tenant.to_string()
/// }
/// ```
#[derive(Debug, Clone)]
pub struct CurrentTenant(pub ResolvedTenant);

impl CurrentTenant {
    /// The tenant identifier.
    pub fn id(&self) -> &TenantId {
        &self.0.tenant
    }

    /// Where the identifier came from.
    pub fn source(&self) -> IdentifierSource {
        self.0.source
    }

    /// The tenant's connection handle.
    pub fn connection(&self) -> &ConnectionHandle {
        &self.0.connection
    }
}

impl<S> FromRequestParts<S> for CurrentTenant
where
    S: Send + Sync,
{
    type Rejection = TenantRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<ResolvedTenant>()
            .cloned()
            .map(CurrentTenant)
            .ok_or_else(|| {
                TenantRejection(TenantError::missing_context(
                    "no tenant was resolved for this request; is TenantLayer installed?",
                ))
            })
    }
}

/// The connection this request should use.
///
/// The tenant's connection when one was resolved, else the default
/// connection of the installed [`ConnectionProvider`](tenantry_core::ConnectionProvider).
#[derive(Clone)]
pub struct TenantConnectionHandle(pub ConnectionHandle);

impl std::fmt::Debug for TenantConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TenantConnectionHandle")
            .field(&self.0.database())
            .finish()
    }
}

impl<S> FromRequestParts<S> for TenantConnectionHandle
where
    S: Send + Sync,
{
    type Rejection = TenantRejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(resolved) = parts.extensions.get::<ResolvedTenant>() {
            if resolved.connection.is_ready() {
                return Ok(Self(resolved.connection.clone()));
            }
        }
        provider::connection().map(Self).map_err(TenantRejection)
    }
}
