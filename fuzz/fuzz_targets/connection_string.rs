//! Fuzz target for SQL Server connection string parsing.
//!
//! Both URL and ADO forms go through the same entry point. Parse errors must
//! never echo a password back.
//!
//! Run with:
//! ```bash
//! cargo +nightly fuzz run fuzz_connection_string
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use tenantry_core::ServerAddress;
use tenantry_mssql::MssqlConfig;

const MARKER: &str = "Pw0rdMarker";

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    let _ = ServerAddress::parse(input);

    if let Ok(config) = MssqlConfig::from_connection_string(input) {
        let _ = config.to_tiberius_config();
    }

    if input.contains(MARKER) {
        return;
    }
    let with_password = format!("{};password={}", input, MARKER);
    if let Err(err) = MssqlConfig::from_connection_string(&with_password) {
        assert!(!err.to_string().contains(MARKER));
    }
});
