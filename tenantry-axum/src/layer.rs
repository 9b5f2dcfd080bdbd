//! Tower middleware that scopes each request to its tenant.

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use http::Request;
use http::request::Parts;
use tenantry_core::{
    BypassRules, ErrorClass, RequestMetadata, TenancyConfig, TenantResolver, context,
};
use tower_layer::Layer;
use tower_service::Service;
use tracing::{Instrument, debug, error, info_span, warn};

use crate::error::TenantRejection;

/// Copy what tenant resolution needs out of the request head.
pub fn metadata_from_parts(parts: &Parts) -> RequestMetadata {
    let path_and_query = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let mut meta = RequestMetadata::new(parts.method.as_str(), path_and_query);
    for (name, value) in parts.headers.iter() {
        if let Ok(value) = value.to_str() {
            meta.insert_header(name.as_str(), value.to_string());
        }
    }
    match parts.uri.authority() {
        Some(authority) => meta.with_authority(authority.as_str()),
        None => meta,
    }
}

/// Layer establishing the request context and resolving the tenant.
///
/// ```rust,ignore
/// use axum::{Router, routing::get};
/// use tenantry_axum::TenantLayer;
///
/// let app = Router::new()
///     .route("/rest/workflows", get(list_workflows))
///     .layer(TenantLayer::new(resolver));
/// ```
#[derive(Clone)]
pub struct TenantLayer {
    resolver: TenantResolver,
    bypass: Arc<BypassRules>,
}

impl TenantLayer {
    /// Create a layer with the default bypass rules.
    pub fn new(resolver: TenantResolver) -> Self {
        Self {
            resolver,
            bypass: Arc::new(BypassRules::defaults()),
        }
    }

    /// Create a layer with the bypass rules of a loaded configuration.
    pub fn from_config(config: &TenancyConfig, resolver: TenantResolver) -> Self {
        Self::new(resolver).with_bypass(config.bypass_rules())
    }

    /// Replace the bypass rules.
    pub fn with_bypass(mut self, rules: BypassRules) -> Self {
        self.bypass = Arc::new(rules);
        self
    }

    /// The resolver.
    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }
}

impl<S> Layer<S> for TenantLayer {
    type Service = TenantMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TenantMiddleware {
            inner,
            resolver: self.resolver.clone(),
            bypass: self.bypass.clone(),
        }
    }
}

/// Service produced by [`TenantLayer`].
#[derive(Clone)]
pub struct TenantMiddleware<S> {
    inner: S,
    resolver: TenantResolver,
    bypass: Arc<BypassRules>,
}

impl<S, ReqBody> Service<Request<ReqBody>> for TenantMiddleware<S>
where
    S: Service<Request<ReqBody>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    ReqBody: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<ReqBody>) -> Self::Future {
        // The clone is not ready; keep the service that was polled.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let resolver = self.resolver.clone();
        let bypass = self.bypass.clone();

        let (mut parts, body) = request.into_parts();
        let meta = metadata_from_parts(&parts);
        let span = info_span!("tenant_request", method = %parts.method, path = %parts.uri.path());

        Box::pin(
            context::run(meta.clone(), async move {
                if bypass.matches(&meta) {
                    debug!("bypass rule matched, serving with default connection");
                    return inner.call(Request::from_parts(parts, body)).await;
                }

                let started = Instant::now();
                match resolver.resolve(&meta).await {
                    Ok(resolved) => {
                        debug!(
                            tenant = %resolved.tenant,
                            source = %resolved.source,
                            database = resolved.connection.database(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "tenant resolved"
                        );
                        context::attach_tenant(resolved.tenant.clone(), resolved.connection.clone());
                        parts.extensions.insert(resolved);
                        inner.call(Request::from_parts(parts, body)).await
                    }
                    Err(err) => {
                        let tenant = err.tenant.as_ref().map(ToString::to_string);
                        match err.class() {
                            ErrorClass::UnknownTenant | ErrorClass::InactiveTenant => {
                                warn!(tenant = ?tenant, code = %err.code, "tenant rejected");
                            }
                            ErrorClass::Infrastructure | ErrorClass::Configuration => {
                                error!(tenant = ?tenant, code = %err.code, error = %err, "tenant resolution failed");
                            }
                        }
                        Ok(TenantRejection(err).into_response())
                    }
                }
            })
            .instrument(span),
        )
    }
}
