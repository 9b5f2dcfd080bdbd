//! Operator endpoints for inspecting and clearing the connection cache.
//!
//! Mount behind operator authentication:
//!
//! ```rust,ignore
//! let app = Router::new()
//!     .nest("/admin/tenants", tenantry_axum::admin::router(resolver.cache().clone()))
//!     .route_layer(require_operator);
//! ```

use axum::Json;
use axum::Router;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get};
use http::StatusCode;
use serde::Serialize;
use tenantry_core::{CacheStats, CachedTenant, ConnectionCache, IdentifierKind, TenantId};
use tracing::info;

/// Body of `GET /cache`.
#[derive(Debug, Clone, Serialize)]
pub struct CacheReport {
    /// Ready entries.
    pub size: usize,
    /// Initialisations in flight.
    pub pending: usize,
    /// The ready entries.
    pub tenants: Vec<CachedTenant>,
    /// Counters.
    pub stats: CacheStats,
}

/// Body of the eviction endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvictionReport {
    /// Entries removed.
    pub evicted: usize,
}

/// Routes:
///
/// - `GET /cache`: report the cached tenants and counters
/// - `DELETE /cache`: evict every tenant
/// - `DELETE /cache/{kind}/{value}`: evict one tenant, 404 when absent
pub fn router<S>(cache: ConnectionCache) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/cache", get(report).delete(evict_all))
        .route("/cache/{kind}/{value}", delete(evict_one))
        .with_state(cache)
}

async fn report(State(cache): State<ConnectionCache>) -> Json<CacheReport> {
    let tenants = cache.entries();
    let stats = cache.stats();
    Json(CacheReport {
        size: tenants.len(),
        pending: stats.pending,
        tenants,
        stats,
    })
}

async fn evict_all(State(cache): State<ConnectionCache>) -> Json<EvictionReport> {
    let evicted = cache.evict_all();
    info!(evicted, "cache cleared by operator");
    Json(EvictionReport { evicted })
}

async fn evict_one(
    State(cache): State<ConnectionCache>,
    Path((kind, value)): Path<(String, String)>,
) -> Response {
    let Some(kind) = IdentifierKind::parse(&kind) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({
                "error": "invalid_kind",
                "message": "kind must be one of: domain, database, guid",
            })),
        )
            .into_response();
    };
    let tenant = TenantId::new(kind, value);
    if cache.evict(&tenant) {
        info!(tenant = %tenant, "tenant evicted by operator");
        Json(EvictionReport { evicted: 1 }).into_response()
    } else {
        (StatusCode::NOT_FOUND, Json(EvictionReport { evicted: 0 })).into_response()
    }
}
