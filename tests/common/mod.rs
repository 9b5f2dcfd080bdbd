//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tenantry::{
    ConnectionConfig, ConnectionDefaults, ConnectionFactory, ConnectionHandle, ServerAddress,
    StaticCredentialStore, TenantConnection, TenantError, TenantResult,
};

/// In-memory connection that records whether it was closed.
pub struct MemoryConnection {
    pub database: String,
    pub closed: AtomicBool,
}

impl MemoryConnection {
    pub fn handle(database: &str) -> ConnectionHandle {
        Arc::new(Self {
            database: database.to_string(),
            closed: AtomicBool::new(false),
        })
    }

    pub fn is_closed(handle: &ConnectionHandle) -> bool {
        tenantry::handle::downcast::<MemoryConnection>(handle)
            .map(|c| c.closed.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

#[async_trait]
impl TenantConnection for MemoryConnection {
    fn is_ready(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    fn database(&self) -> &str {
        &self.database
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Factory that counts connects and can be told to fail.
#[derive(Default)]
pub struct CountingFactory {
    pub calls: AtomicUsize,
    pub delay: Duration,
    pub fail: AtomicBool,
}

impl CountingFactory {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for CountingFactory {
    async fn connect(&self, config: ConnectionConfig) -> TenantResult<ConnectionHandle> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(TenantError::connection(format!(
                "login failed for database '{}'",
                config.database
            )));
        }
        Ok(MemoryConnection::handle(&config.database))
    }
}

pub fn config(database: &str) -> ConnectionConfig {
    ConnectionConfig::new(
        &ServerAddress::parse("sql01.internal,1433").expect("valid address"),
        database,
        SecretString::new("app_user".to_string().into()),
        SecretString::new("s3cret".to_string().into()),
        &ConnectionDefaults::default(),
    )
}

/// Store with `acme`, `globex` (inactive), `dev` and `globalcorp` (with a GUID).
pub fn store() -> StaticCredentialStore {
    let store = StaticCredentialStore::new();
    store
        .register("acme", config("acme_db"))
        .register("globex", config("globex_db"))
        .register("dev", config("dev_db"))
        .register_with_guid(
            "globalcorp",
            Some("6F1C2D3E-0000-4000-8000-00000000AB12"),
            config("globalcorp"),
        );
    store.deactivate("globex");
    store
}
