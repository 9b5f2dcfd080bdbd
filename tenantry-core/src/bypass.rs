//! Paths that skip tenant resolution.
//!
//! Requests matching a rule still run inside a request context, just without a
//! tenant, so the provider hands out the default connection.

use serde::Deserialize;

use crate::metadata::RequestMetadata;

/// One bypass rule: a path fragment, optionally restricted to a method.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BypassRule {
    /// Substring of the request path.
    pub pattern: String,
    /// Method the rule applies to; all methods when absent.
    #[serde(default)]
    pub method: Option<String>,
}

impl BypassRule {
    /// A rule matching every method.
    pub fn path(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            method: None,
        }
    }

    /// A rule matching one method.
    pub fn method(method: &str, pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            method: Some(method.to_ascii_uppercase()),
        }
    }

    /// Parse `"/healthz"` or `"POST /rest/login"`.
    pub fn parse(rule: &str) -> Option<Self> {
        let rule = rule.trim();
        if rule.is_empty() {
            return None;
        }
        match rule.split_once(char::is_whitespace) {
            Some((method, pattern)) if !pattern.trim().is_empty() => {
                Some(Self::method(method, pattern.trim()))
            }
            _ => Some(Self::path(rule)),
        }
    }

    /// Whether the rule matches the request.
    pub fn matches(&self, meta: &RequestMetadata) -> bool {
        let method_ok = self
            .method
            .as_deref()
            .is_none_or(|m| m.eq_ignore_ascii_case(meta.method()));
        method_ok && meta.path().contains(&self.pattern)
    }
}

/// The full set of bypass rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BypassRules {
    rules: Vec<BypassRule>,
    websocket_upgrades: bool,
}

impl Default for BypassRules {
    fn default() -> Self {
        Self::defaults()
    }
}

impl BypassRules {
    /// Static assets, health checks and the public auth endpoints.
    pub fn defaults() -> Self {
        let rules = [
            "/assets/",
            "/static/",
            "/node-icon/",
            "/types/",
            "/favicon.ico",
            "/rest/settings",
            "/rest/push",
            "POST /rest/login",
            "/rest/oauth",
            "/rest/forgot-password",
            "/rest/resolve-signup-token",
            "/healthz",
            "/metrics",
        ]
        .iter()
        .filter_map(|s| BypassRule::parse(s))
        .collect();
        Self {
            rules,
            websocket_upgrades: true,
        }
    }

    /// No rules at all.
    pub fn none() -> Self {
        Self {
            rules: Vec::new(),
            websocket_upgrades: false,
        }
    }

    /// Add a rule.
    pub fn with_rule(mut self, rule: BypassRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Whether WebSocket upgrades bypass resolution.
    pub fn with_websocket_upgrades(mut self, enabled: bool) -> Self {
        self.websocket_upgrades = enabled;
        self
    }

    /// Append rules.
    pub fn extend(&mut self, rules: impl IntoIterator<Item = BypassRule>) {
        self.rules.extend(rules);
    }

    /// The configured rules.
    pub fn rules(&self) -> &[BypassRule] {
        &self.rules
    }

    /// Whether tenant resolution should be skipped for this request.
    pub fn matches(&self, meta: &RequestMetadata) -> bool {
        (self.websocket_upgrades && meta.is_websocket_upgrade())
            || self.rules.iter().any(|rule| rule.matches(meta))
    }
}
