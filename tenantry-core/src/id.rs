//! Tenant identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// How a tenant was named by the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentifierKind {
    /// Company domain, usually the first hostname label.
    Domain,
    /// Tenant database name.
    DatabaseName,
    /// Tenant database globally-unique id.
    DatabaseGuid,
}

impl IdentifierKind {
    /// Short name used in paths and display output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Domain => "domain",
            Self::DatabaseName => "database",
            Self::DatabaseGuid => "guid",
        }
    }

    /// Parse the short name produced by [`as_str`](Self::as_str).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "domain" => Some(Self::Domain),
            "database" | "database_name" => Some(Self::DatabaseName),
            "guid" | "database_guid" => Some(Self::DatabaseGuid),
            _ => None,
        }
    }
}

/// Key identifying one tenant's backend store.
///
/// The kind takes part in equality, so a domain and a database name with the
/// same text are different cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TenantId {
    kind: IdentifierKind,
    value: SmolStr,
}

impl TenantId {
    /// Create an identifier of the given kind.
    ///
    /// Values are trimmed. Domains and GUIDs are lower-cased.
    pub fn new(kind: IdentifierKind, value: impl Into<String>) -> Self {
        let value = value.into();
        let value = value.trim();
        let value = match kind {
            IdentifierKind::Domain | IdentifierKind::DatabaseGuid => {
                SmolStr::new(value.to_ascii_lowercase())
            }
            IdentifierKind::DatabaseName => SmolStr::new(value),
        };
        Self { kind, value }
    }

    /// Identify a tenant by company domain.
    pub fn domain(value: impl Into<String>) -> Self {
        Self::new(IdentifierKind::Domain, value)
    }

    /// Identify a tenant by database name.
    pub fn database(value: impl Into<String>) -> Self {
        Self::new(IdentifierKind::DatabaseName, value)
    }

    /// Identify a tenant by database GUID.
    pub fn guid(value: impl Into<String>) -> Self {
        Self::new(IdentifierKind::DatabaseGuid, value)
    }

    /// The identifier kind.
    pub fn kind(&self) -> IdentifierKind {
        self.kind
    }

    /// The raw value.
    pub fn as_str(&self) -> &str {
        &self.value
    }

    /// Whether the value is empty after trimming.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// Consume and return the raw value.
    pub fn into_inner(self) -> String {
        self.value.into()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            IdentifierKind::Domain => f.write_str(&self.value),
            kind => write!(f, "{}:{}", kind.as_str(), self.value),
        }
    }
}

impl From<&str> for TenantId {
    fn from(s: &str) -> Self {
        Self::domain(s)
    }
}

impl From<String> for TenantId {
    fn from(s: String) -> Self {
        Self::domain(s)
    }
}
