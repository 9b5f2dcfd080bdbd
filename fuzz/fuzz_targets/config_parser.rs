//! Fuzz target for the tenancy configuration parser.
//!
//! Feeds arbitrary TOML to the parser and, when it parses, runs the
//! environment overlay and validation over the result.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_config_parser
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use tenantry_core::env::{MapEnvSource, expand};
use tenantry_core::TenancyConfig;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let env = MapEnvSource::new()
        .set("CP_HOST", "sql-cp01")
        .set("TENANTRY_POOL_SIZE", "4");

    // Arbitrary text is also a plausible connection string template.
    let _ = expand(input, &env);

    let Ok(config) = TenancyConfig::from_toml_str(input) else {
        return;
    };
    let Ok(config) = config.with_env(&env) else {
        return;
    };
    let _ = config.validate();
    let _ = config.cache_config();
    let _ = config.bypass_rules();
    let _ = config.tenant_mode_enabled();
});
