//! Structured fuzzing for request metadata parsing and bypass matching.
//!
//! Generates requests with arbitrary hosts, cookies and query strings and
//! checks that hostname extraction upholds its guarantees.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_request_metadata
//! ```

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tenantry_core::{BypassRule, BypassRules, IdentifierKind, RequestMetadata, TenantId};

/// A generated request head.
#[derive(Debug, Arbitrary)]
struct FuzzRequest {
    method: String,
    path_and_query: String,
    host: Option<String>,
    forwarded_host: Option<String>,
    cookie: Option<String>,
    headers: Vec<(String, String)>,
    bypass_rules: Vec<String>,
    kind: String,
}

impl FuzzRequest {
    fn metadata(&self) -> RequestMetadata {
        let mut meta = RequestMetadata::new(self.method.as_str(), &self.path_and_query);
        if let Some(host) = &self.host {
            meta.insert_header("host", host.clone());
        }
        if let Some(forwarded) = &self.forwarded_host {
            meta.insert_header("x-forwarded-host", forwarded.clone());
        }
        if let Some(cookie) = &self.cookie {
            meta.insert_header("cookie", cookie.clone());
        }
        for (name, value) in self.headers.iter().take(16) {
            meta.insert_header(name, value.clone());
        }
        meta
    }
}

fuzz_target!(|input: FuzzRequest| {
    let meta = input.metadata();

    for trust in [false, true] {
        if let Some(hostname) = meta.hostname(trust) {
            assert!(!hostname.is_empty());
            assert_eq!(hostname, hostname.to_ascii_lowercase());

            let label = hostname.split('.').next().unwrap_or_default();
            let tenant = TenantId::domain(label);
            assert_eq!(tenant, TenantId::domain(label.to_ascii_uppercase()));
        }
    }

    let _ = meta.cookie("database");
    let _ = meta.query_param("DatabaseGUID");
    let _ = meta.is_websocket_upgrade();

    let mut rules = BypassRules::defaults();
    rules.extend(input.bypass_rules.iter().filter_map(|r| BypassRule::parse(r)));
    let _ = rules.matches(&meta);
    assert!(!BypassRules::none().matches(&meta));

    if let Some(kind) = IdentifierKind::parse(&input.kind) {
        let _ = TenantId::new(kind, input.path_and_query.as_str()).to_string();
    }
});
