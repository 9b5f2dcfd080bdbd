//! Environment access and `${VAR}` expansion for configuration values.

use std::collections::HashMap;

use crate::error::{ErrorCode, TenantError, TenantResult};

/// Source for environment variables.
pub trait EnvSource: Send + Sync {
    /// Get an environment variable value.
    fn get(&self, name: &str) -> Option<String>;

    /// Get a variable, treating an empty value as unset.
    fn get_non_empty(&self, name: &str) -> Option<String> {
        self.get(name).filter(|v| !v.trim().is_empty())
    }
}

/// Process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdEnvSource;

impl EnvSource for StdEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Environment source backed by a HashMap.
#[derive(Debug, Clone, Default)]
pub struct MapEnvSource {
    vars: HashMap<String, String>,
}

impl MapEnvSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a variable.
    pub fn set(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }
}

impl EnvSource for MapEnvSource {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }
}

/// Expand `${VAR}`, `${VAR:-default}` and `${VAR:?message}` references.
///
/// A `$` not followed by `{` is kept literally.
///
/// ```rust
/// use tenantry_core::env::{expand, MapEnvSource};
///
/// let env = MapEnvSource::new().set("CP_HOST", "sql01");
/// let url = expand("server=${CP_HOST};database=${CP_DB:-Elevate}", &env).unwrap();
/// assert_eq!(url, "server=sql01;database=Elevate");
/// ```
pub fn expand(input: &str, env: &dyn EnvSource) -> TenantResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let body_start = start + 2;
        let Some(len) = rest[body_start..].find('}') else {
            return Err(TenantError::invalid_config(format!(
                "unterminated variable reference in '{}'",
                input
            )));
        };
        let body = &rest[body_start..body_start + len];
        out.push_str(&resolve_reference(body, env)?);
        rest = &rest[body_start + len + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn resolve_reference(body: &str, env: &dyn EnvSource) -> TenantResult<String> {
    let (name, modifier) = match body.split_once(':') {
        Some((name, modifier)) => (name, Some(modifier)),
        None => (body, None),
    };
    if name.is_empty() {
        return Err(TenantError::invalid_config("empty variable name"));
    }
    if let Some(value) = env.get_non_empty(name) {
        return Ok(value);
    }
    match modifier {
        Some(m) if m.starts_with('-') => Ok(m[1..].to_string()),
        Some(m) if m.starts_with('?') && m.len() > 1 => {
            Err(TenantError::new(ErrorCode::MissingConfiguration, &m[1..]))
        }
        _ => Err(TenantError::missing_config(name)),
    }
}
