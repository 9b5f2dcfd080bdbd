//! Stable HTTP responses for tenant failures.

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::{HeaderValue, StatusCode, header};
use serde::Serialize;
use tenantry_core::{ErrorClass, TenantError};
use thiserror::Error;

/// Seconds clients are asked to wait before retrying an unavailable tenant.
pub const RETRY_AFTER_SECS: u32 = 5;

/// JSON body of every tenant failure response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    /// Class name: `unknown_tenant`, `inactive_tenant`, `tenant_unavailable`
    /// or `configuration_error`.
    pub error: &'static str,
    /// Stable error code, e.g. `T1001`.
    pub code: String,
    /// End-user safe message.
    pub message: &'static str,
}

impl From<&TenantError> for ErrorBody {
    fn from(err: &TenantError) -> Self {
        Self {
            error: err.class().as_str(),
            code: err.code.code(),
            message: err.public_message(),
        }
    }
}

/// Status code for an error class.
pub fn status_for(class: ErrorClass) -> StatusCode {
    match class {
        ErrorClass::UnknownTenant | ErrorClass::InactiveTenant => StatusCode::FORBIDDEN,
        ErrorClass::Infrastructure => StatusCode::SERVICE_UNAVAILABLE,
        ErrorClass::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// A [`TenantError`] rendered as an HTTP response.
///
/// The body never carries the internal message, only the stable code and
/// the public text.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct TenantRejection(#[from] pub TenantError);

impl IntoResponse for TenantRejection {
    fn into_response(self) -> Response {
        let err = self.0;
        let mut response = (status_for(err.class()), Json(ErrorBody::from(&err))).into_response();
        if err.is_retryable() {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(RETRY_AFTER_SECS));
        }
        response
    }
}
