//! Framework-neutral view of the inbound request.
//!
//! The HTTP boundary copies what tenant resolution needs into a
//! [`RequestMetadata`]; nothing downstream depends on a web framework.

use std::collections::HashMap;

use url::form_urlencoded;

/// Request data consumed by tenant resolution and bypass rules.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    method: String,
    path: String,
    host: Option<String>,
    forwarded_host: Option<String>,
    headers: HashMap<String, String>,
    cookies: HashMap<String, String>,
    query: HashMap<String, String>,
}

impl RequestMetadata {
    /// Create metadata for a method and path. The path may carry a query string.
    pub fn new(method: impl Into<String>, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };
        let mut meta = Self {
            method: method.into().to_ascii_uppercase(),
            path: path.to_string(),
            ..Default::default()
        };
        if let Some(query) = query {
            meta.set_query(query);
        }
        meta
    }

    /// Set the URI authority, used when no `Host` header is present.
    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        if self.host.is_none() {
            self.host = Some(authority.into());
        }
        self
    }

    /// Add a header. Names are case-insensitive; `Host`, `X-Forwarded-Host`
    /// and `Cookie` are also parsed.
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert_header(name, value.into());
        self
    }

    /// Add a header in place.
    pub fn insert_header(&mut self, name: &str, value: String) {
        let name = name.to_ascii_lowercase();
        match name.as_str() {
            "host" => self.host = Some(value.clone()),
            "x-forwarded-host" => {
                let first = value.split(',').next().unwrap_or_default().trim();
                if !first.is_empty() {
                    self.forwarded_host = Some(first.to_string());
                }
            }
            "cookie" => self.parse_cookies(&value),
            _ => {}
        }
        self.headers
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    fn parse_cookies(&mut self, raw: &str) {
        for pair in raw.split(';') {
            if let Some((name, value)) = pair.split_once('=') {
                let name = name.trim();
                if !name.is_empty() {
                    self.cookies
                        .entry(name.to_string())
                        .or_insert_with(|| value.trim().trim_matches('"').to_string());
                }
            }
        }
    }

    fn set_query(&mut self, query: &str) {
        for (key, value) in form_urlencoded::parse(query.as_bytes()) {
            self.query
                .entry(key.into_owned())
                .or_insert_with(|| value.into_owned());
        }
    }

    /// The request method, upper-cased.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The request path without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Look up a header case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Look up a cookie by exact name.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    /// Look up a decoded query parameter. The first occurrence wins.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    /// The `Host` value (or URI authority), including any port.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The first `X-Forwarded-Host` entry, if any.
    pub fn forwarded_host(&self) -> Option<&str> {
        self.forwarded_host.as_deref()
    }

    /// The host the client addressed. The forwarded host wins when trusted.
    pub fn effective_host(&self, trust_forwarded: bool) -> Option<&str> {
        if trust_forwarded {
            if let Some(forwarded) = self.forwarded_host() {
                return Some(forwarded);
            }
        }
        self.host()
    }

    /// The effective host without its port, lower-cased.
    ///
    /// `[::1]:5678` yields `::1`.
    pub fn hostname(&self, trust_forwarded: bool) -> Option<String> {
        let host = self.effective_host(trust_forwarded)?.trim();
        let name = if let Some(rest) = host.strip_prefix('[') {
            rest.split(']').next().unwrap_or_default()
        } else if host.matches(':').count() > 1 {
            // bare IPv6 literal
            host
        } else {
            host.split(':').next().unwrap_or_default()
        };
        let name = name.trim_end_matches('.');
        if name.is_empty() {
            None
        } else {
            Some(name.to_ascii_lowercase())
        }
    }

    /// Whether the request asks to upgrade to a WebSocket.
    pub fn is_websocket_upgrade(&self) -> bool {
        self.header("upgrade")
            .is_some_and(|v| v.eq_ignore_ascii_case("websocket"))
    }
}
