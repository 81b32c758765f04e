//! Fuzz testing for payload sanitization.
//!
//! Feeds arbitrary bytes through the JSON parser and, when they parse, through
//! [`sanitize`]. Checks that sanitization:
//!
//! - Never panics, whatever the nesting or content
//! - Leaves no key starting with `$` or containing `.`
//! - Is idempotent
//!
//! # Running the Fuzz Tests
//!
//! ```bash
//! cargo +nightly install cargo-fuzz
//! cargo +nightly fuzz run fuzz_sanitize -- -max_total_time=60
//! ```

#![no_main]

use libfuzzer_sys::fuzz_target;
use serde_json::Value;
use storefront_gateway::sanitize::{clean_html, sanitize};

fn has_unsafe_key(value: &Value) -> bool {
    match value {
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key.starts_with('$') || key.contains('.') || has_unsafe_key(value)),
        Value::Array(items) => items.iter().any(has_unsafe_key),
        _ => false,
    }
}

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        let cleaned = clean_html(text);
        assert_eq!(clean_html(&cleaned), cleaned);
    }

    let Ok(value) = serde_json::from_slice::<Value>(data) else {
        return;
    };

    let once = sanitize(value);
    assert!(!has_unsafe_key(&once));
    assert_eq!(sanitize(once.clone()), once);
});
