//! Integration tests for tenant resolution, caching and the request context.
//!
//! These tests drive the public API end to end with an in-memory credential
//! store and a counting connection factory.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{CountingFactory, MemoryConnection, store};
use pretty_assertions::assert_eq;
use tenantry::{
    CacheConfig, ConnectionProvider, ErrorClass, ErrorCode, IdentifierSource, RequestMetadata,
    ResolutionConfig, StaleHandlePolicy, TenantConnection, TenantId, TenantResolver, context,
};

fn resolver_with(factory: Arc<CountingFactory>, resolution: ResolutionConfig) -> TenantResolver {
    TenantResolver::builder()
        .store(store())
        .shared_factory(factory)
        .resolution(resolution)
        .cache_config(
            CacheConfig::default()
                .with_eviction_grace(Duration::from_millis(200))
                .with_drain_poll(Duration::from_millis(10)),
        )
        .build()
        .expect("resolver builds")
}

fn resolver(factory: Arc<CountingFactory>) -> TenantResolver {
    resolver_with(factory, ResolutionConfig::default().with_development_tenant("dev"))
}

fn request(host: &str, path: &str) -> RequestMetadata {
    RequestMetadata::new("GET", path).with_header("Host", host)
}

#[tokio::test]
async fn test_hostname_selects_tenant() {
    let factory = Arc::new(CountingFactory::default());
    let resolver = resolver(factory.clone());

    let resolved = resolver
        .resolve(&request("acme.example.com", "/rest/workflows"))
        .await
        .unwrap();

    assert_eq!(resolved.tenant, TenantId::domain("acme"));
    assert_eq!(resolved.source, IdentifierSource::Hostname);
    assert_eq!(resolved.connection.database(), "acme_db");
    assert_eq!(factory.calls(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_initialisation() {
    let factory = Arc::new(CountingFactory::with_delay(Duration::from_millis(50)));
    let resolver = resolver(factory.clone());

    let tasks: Vec<_> = (0..16)
        .map(|_| {
            let resolver = resolver.clone();
            tokio::spawn(async move {
                resolver
                    .resolve(&request("acme.example.com", "/rest/workflows"))
                    .await
            })
        })
        .collect();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap().connection);
    }

    assert_eq!(factory.calls(), 1);
    assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    let stats = resolver.cache().stats();
    assert_eq!(stats.initializations, 1);
    assert_eq!(stats.size, 1);
    assert_eq!(stats.pending, 0);
}

#[tokio::test]
async fn test_explicit_selectors_take_precedence_over_host() {
    let factory = Arc::new(CountingFactory::default());
    let resolver = resolver(factory);

    let by_header = request("acme.example.com", "/rest/workflows").with_header("database", "globalcorp");
    let resolved = resolver.resolve(&by_header).await.unwrap();
    assert_eq!(resolved.source, IdentifierSource::Header);
    assert_eq!(resolved.connection.database(), "globalcorp");

    let by_cookie = request("acme.example.com", "/rest/workflows")
        .with_header("Cookie", "theme=dark; database=globalcorp");
    let resolved = resolver.resolve(&by_cookie).await.unwrap();
    assert_eq!(resolved.source, IdentifierSource::Cookie);
    assert_eq!(resolved.connection.database(), "globalcorp");

    let by_query = request("acme.example.com", "/rest/workflows?database=globalcorp");
    let resolved = resolver.resolve(&by_query).await.unwrap();
    assert_eq!(resolved.source, IdentifierSource::Query);
    assert_eq!(resolved.tenant, TenantId::database("globalcorp"));
}

#[tokio::test]
async fn test_guid_query_parameter_is_case_insensitive() {
    let factory = Arc::new(CountingFactory::default());
    let resolver = resolver(factory);

    let meta = request(
        "acme.example.com",
        "/rest/workflows?DatabaseGUID=6f1c2d3e-0000-4000-8000-00000000ab12",
    );
    let resolved = resolver.resolve(&meta).await.unwrap();

    assert_eq!(resolved.tenant.kind(), tenantry::IdentifierKind::DatabaseGuid);
    assert_eq!(resolved.connection.database(), "globalcorp");
}

#[tokio::test]
async fn test_loopback_uses_development_tenant() {
    let factory = Arc::new(CountingFactory::default());
    let resolver = resolver(factory);

    for host in ["localhost:5678", "127.0.0.1:5678", "[::1]:5678"] {
        let resolved = resolver.resolve(&request(host, "/rest/workflows")).await.unwrap();
        assert_eq!(resolved.source, IdentifierSource::DevelopmentDefault, "host {}", host);
        assert_eq!(resolved.connection.database(), "dev_db");
    }
}

#[tokio::test]
async fn test_loopback_without_development_tenant_is_configuration_error() {
    let factory = Arc::new(CountingFactory::default());
    let resolver = resolver_with(factory.clone(), ResolutionConfig::default());

    let err = resolver
        .resolve(&request("localhost:5678", "/rest/workflows"))
        .await
        .unwrap_err();

    assert_eq!(err.code, ErrorCode::MissingConfiguration);
    assert_eq!(err.class(), ErrorClass::Configuration);
    assert_eq!(factory.calls(), 0);
}

#[tokio::test]
async fn test_unknown_and_inactive_tenants_are_rejected() {
    let factory = Arc::new(CountingFactory::default());
    let resolver = resolver(factory.clone());

    let unknown = resolver
        .resolve(&request("initech.example.com", "/"))
        .await
        .unwrap_err();
    assert!(unknown.is_unknown_tenant());
    assert_eq!(unknown.tenant, Some(TenantId::domain("initech")));

    let inactive = resolver
        .resolve(&request("globex.example.com", "/"))
        .await
        .unwrap_err();
    assert!(inactive.is_inactive_tenant());

    assert_eq!(factory.calls(), 0);
    assert!(resolver.cache().is_empty());
    assert_eq!(resolver.cache().stats().failures, 2);
}

#[tokio::test]
async fn test_unknown_selector_falls_back_to_host() {
    let factory = Arc::new(CountingFactory::default());
    let resolver = resolver(factory);

    let meta = request("acme.example.com", "/").with_header("database", "no_such_db");
    let resolved = resolver.resolve(&meta).await.unwrap();
    assert_eq!(resolved.tenant, TenantId::domain("acme"));
    assert_eq!(resolved.source, IdentifierSource::Hostname);

    let strict = resolver_with(
        Arc::new(CountingFactory::default()),
        ResolutionConfig::default().without_hostname_fallback(),
    );
    let err = strict.resolve(&meta).await.unwrap_err();
    assert!(err.is_unknown_tenant());
}

#[tokio::test]
async fn test_failed_connect_is_not_cached() {
    let factory = Arc::new(CountingFactory::default());
    factory.fail.store(true, std::sync::atomic::Ordering::SeqCst);
    let resolver = resolver(factory.clone());
    let meta = request("acme.example.com", "/");

    let err = resolver.resolve(&meta).await.unwrap_err();
    assert_eq!(err.code, ErrorCode::ConnectionFailed);
    assert_eq!(err.class(), ErrorClass::Infrastructure);
    assert!(err.is_retryable());
    assert_eq!(err.tenant, Some(TenantId::domain("acme")));
    assert!(resolver.cache().is_empty());

    factory.fail.store(false, std::sync::atomic::Ordering::SeqCst);
    let resolved = resolver.resolve(&meta).await.unwrap();
    assert_eq!(resolved.connection.database(), "acme_db");
    assert_eq!(factory.calls(), 2);
}

#[tokio::test]
async fn test_eviction_closes_after_release() {
    let factory = Arc::new(CountingFactory::default());
    let resolver = resolver(factory.clone());
    let meta = request("acme.example.com", "/");

    let first = resolver.resolve(&meta).await.unwrap().connection;
    assert!(resolver.cache().evict(&TenantId::domain("acme")));
    assert!(resolver.cache().get(&TenantId::domain("acme")).is_none());
    assert!(first.is_ready(), "in-flight holder keeps a usable handle");

    let second = resolver.resolve(&meta).await.unwrap().connection;
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(factory.calls(), 2);

    let weak = Arc::downgrade(&first);
    drop(first);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(weak.upgrade().is_none(), "released handle is closed before the grace period ends");
    assert!(!MemoryConnection::is_closed(&second));
}

#[tokio::test]
async fn test_grace_period_closes_handle_still_in_use() {
    let factory = Arc::new(CountingFactory::default());
    let resolver = resolver(factory);

    let held = resolver
        .resolve(&request("acme.example.com", "/"))
        .await
        .unwrap()
        .connection;
    resolver.cache().evict(&TenantId::domain("acme"));

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(MemoryConnection::is_closed(&held));
}

#[tokio::test]
async fn test_revalidation_evicts_deactivated_tenant() {
    let store = store();
    let factory = Arc::new(CountingFactory::default());
    let resolver = TenantResolver::builder()
        .store(store.clone())
        .shared_factory(factory)
        .cache_config(CacheConfig::default().with_stale_handle_policy(
            StaleHandlePolicy::Revalidate {
                interval: Duration::ZERO,
            },
        ))
        .build()
        .unwrap();
    let meta = request("acme.example.com", "/");

    resolver.resolve(&meta).await.unwrap();
    store.deactivate("acme");

    let err = resolver.resolve(&meta).await.unwrap_err();
    assert!(err.is_inactive_tenant());
    assert!(resolver.cache().get(&TenantId::domain("acme")).is_none());
}

#[tokio::test]
async fn test_provider_follows_request_context() {
    let factory = Arc::new(CountingFactory::default());
    let resolver = resolver(factory);
    let provider = ConnectionProvider::new(MemoryConnection::handle("control")).unwrap();

    assert_eq!(provider.connection().unwrap().database(), "control");

    let meta = request("acme.example.com", "/rest/workflows");
    let seen = context::run(meta.clone(), {
        let provider = provider.clone();
        async move {
            let before = provider.connection().unwrap().database().to_string();
            let resolved = resolver.resolve(&meta).await.unwrap();
            context::attach_tenant(resolved.tenant, resolved.connection);

            tokio::task::yield_now().await;
            let after = provider.connection().unwrap().database().to_string();
            (before, after, context::current_tenant())
        }
    })
    .await;

    assert_eq!(seen.0, "control");
    assert_eq!(seen.1, "acme_db");
    assert_eq!(seen.2, Some(TenantId::domain("acme")));
    assert_eq!(provider.connection().unwrap().database(), "control");
    assert!(!context::in_scope());
}

#[tokio::test]
async fn test_concurrent_contexts_are_isolated() {
    let factory = Arc::new(CountingFactory::with_delay(Duration::from_millis(5)));
    let resolver = resolver(factory);
    let provider = ConnectionProvider::new(MemoryConnection::handle("control")).unwrap();

    let tasks: Vec<_> = ["acme", "globalcorp", "dev"]
        .into_iter()
        .cycle()
        .take(30)
        .map(|tenant| {
            let resolver = resolver.clone();
            let provider = provider.clone();
            let meta = match tenant {
                "globalcorp" => request("acme.example.com", "/?database=globalcorp"),
                other => request(&format!("{}.example.com", other), "/"),
            };
            tokio::spawn(context::run(meta.clone(), async move {
                let resolved = resolver.resolve(&meta).await.unwrap();
                let expected = resolved.connection.database().to_string();
                context::attach_tenant(resolved.tenant, resolved.connection);
                for _ in 0..5 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    assert_eq!(provider.connection().unwrap().database(), expected);
                }
                expected
            }))
        })
        .collect();

    let mut databases = Vec::new();
    for task in tasks {
        databases.push(task.await.unwrap());
    }
    databases.sort();
    databases.dedup();
    assert_eq!(databases, vec!["acme_db", "dev_db", "globalcorp"]);
}

#[tokio::test]
async fn test_provider_skips_closed_request_connection() {
    let provider = ConnectionProvider::new(MemoryConnection::handle("control")).unwrap();
    let tenant_handle = MemoryConnection::handle("acme_db");
    tenant_handle.close().await;

    let database = context::run(RequestMetadata::new("GET", "/"), async {
        context::attach_tenant(TenantId::domain("acme"), tenant_handle.clone());
        provider.connection().unwrap().database().to_string()
    })
    .await;

    assert_eq!(database, "control");
}

#[tokio::test]
async fn test_shutdown_closes_every_cached_handle() {
    let factory = Arc::new(CountingFactory::default());
    let resolver = resolver(factory);

    let acme = resolver.resolve(&request("acme.example.com", "/")).await.unwrap();
    let dev = resolver.resolve(&request("localhost", "/")).await.unwrap();
    assert_eq!(resolver.cache().len(), 2);

    resolver.cache().shutdown().await;

    assert!(resolver.cache().is_empty());
    assert!(MemoryConnection::is_closed(&acme.connection));
    assert!(MemoryConnection::is_closed(&dev.connection));
}
