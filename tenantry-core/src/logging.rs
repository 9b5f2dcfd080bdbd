//! Structured logging setup.
//!
//! Components log through `tracing` with fields such as `tenant`, `database`
//! and `elapsed_ms`; credentials are never logged. Applications own their
//! subscriber, but [`init`] installs a reasonable one when the
//! `tracing-subscriber` feature is enabled:
//!
//! - `TENANTRY_DEBUG=true|1|yes` - debug level
//! - `TENANTRY_LOG_LEVEL=trace|debug|info|warn|error` - explicit level
//! - `TENANTRY_LOG_FORMAT=json|pretty|compact` - output format (default: json)
//!
//! ```rust,no_run
//! tenantry_core::logging::init();
//! ```

use std::sync::Once;

use crate::env::{EnvSource, StdEnvSource};

static INIT: Once = Once::new();

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per event.
    Json,
    /// Multi-line human readable output.
    Pretty,
    /// Single-line human readable output.
    Compact,
}

/// Logging settings read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// Level applied to the tenantry crates.
    pub level: &'static str,
    /// Output format.
    pub format: LogFormat,
    /// Whether any logging variable was set.
    pub requested: bool,
}

impl LogSettings {
    /// Read `TENANTRY_DEBUG`, `TENANTRY_LOG_LEVEL` and `TENANTRY_LOG_FORMAT`.
    pub fn from_env(env: &dyn EnvSource) -> Self {
        let debug = env
            .get("TENANTRY_DEBUG")
            .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "true" | "1" | "yes"));
        let explicit = env.get("TENANTRY_LOG_LEVEL");
        let level = match explicit.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ if debug => "debug",
            _ => "warn",
        };
        let format = match env.get("TENANTRY_LOG_FORMAT").map(|f| f.to_ascii_lowercase()).as_deref() {
            Some("pretty") => LogFormat::Pretty,
            Some("compact") => LogFormat::Compact,
            _ => LogFormat::Json,
        };
        Self {
            level,
            format,
            requested: debug || explicit.is_some(),
        }
    }

    /// `EnvFilter` directive covering the tenantry crates.
    pub fn directive(&self) -> String {
        ["tenantry", "tenantry_core", "tenantry_mssql", "tenantry_axum"]
            .iter()
            .map(|target| format!("{}={}", target, self.level))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Install a global subscriber once, if logging was requested.
pub fn init() {
    INIT.call_once(|| {
        let settings = LogSettings::from_env(&StdEnvSource);
        if !settings.requested {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let filter =
                EnvFilter::try_new(settings.directive()).unwrap_or_else(|_| EnvFilter::new("warn"));
            let registry = tracing_subscriber::registry().with(filter);
            let installed = match settings.format {
                LogFormat::Json => registry.with(fmt::layer().json()).try_init(),
                LogFormat::Compact => registry.with(fmt::layer().compact()).try_init(),
                LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
            };
            if installed.is_ok() {
                tracing::info!(level = settings.level, format = ?settings.format, "tenantry logging initialized");
            }
        }
    });
}
