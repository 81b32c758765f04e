//! Tests for the public sanitization API.
//!
//! Run with: `cargo test --test sanitize_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use serde_json::{Value, json};
use storefront_gateway::sanitize::{KeyGuard, clean_html, sanitize, strip_markup};

fn contains_unsafe_key(value: &Value) -> bool {
    match value {
        Value::Object(map) => map
            .iter()
            .any(|(key, value)| key.starts_with('$') || key.contains('.') || contains_unsafe_key(value)),
        Value::Array(items) => items.iter().any(contains_unsafe_key),
        _ => false,
    }
}

// =============================================================================
// Operator Keys
// =============================================================================

#[test]
fn test_login_bypass_payload_neutralized() {
    let value = sanitize(json!({
        "email": {"$ne": null},
        "password": {"$gt": ""}
    }));

    assert_eq!(
        value,
        json!({"email": {"_ne": null}, "password": {"_gt": ""}})
    );
}

#[test]
fn test_no_unsafe_key_survives() {
    let value = sanitize(json!({
        "$or": [{"a.b": 1}, {"$and": [{"$in.x": [1, 2]}]}],
        "meta": {"owner.id": {"$exists": true}}
    }));

    assert!(!contains_unsafe_key(&value));
}

#[test]
fn test_rewrite_count_reported() {
    let (_, count) = KeyGuard::default().apply(json!({
        "$where": 1,
        "nested": {"a.b": 2, "ok": 3},
        "list": [{"$gt": 4}]
    }));
    assert_eq!(count, 3);
}

#[test]
fn test_operator_strings_in_values_kept() {
    let input = json!({"note": "use $where carefully", "path": "a.b.c"});
    assert_eq!(sanitize(input.clone()), input);
}

// =============================================================================
// Markup
// =============================================================================

#[test]
fn test_style_element_removed_with_content() {
    assert_eq!(clean_html("<style>body{display:none}</style>Sale"), "Sale");
}

#[test]
fn test_iframe_removed() {
    let cleaned = clean_html(r#"<iframe src="https://evil.example.net"></iframe>ok"#);
    assert!(!cleaned.contains("iframe"));
    assert!(cleaned.contains("ok"));
}

#[test]
fn test_markup_in_keys_untouched() {
    let value = strip_markup(json!({"<b>k</b>": "<script>x</script>v"}));
    assert_eq!(value, json!({"<b>k</b>": "v"}));
}

#[test]
fn test_scalars_pass_through() {
    for scalar in [json!(null), json!(true), json!(0), json!(-1.5), json!(u64::MAX)] {
        assert_eq!(sanitize(scalar.clone()), scalar);
    }
}

// =============================================================================
// Combined
// =============================================================================

#[test]
fn test_structure_preserved() {
    let value = sanitize(json!({
        "items": [{"sku": "A-1", "qty": 2}, {"sku": "<i>B-2</i>", "qty": 1}],
        "$comment": "<script>x</script>gift"
    }));

    assert_eq!(
        value,
        json!({
            "items": [{"sku": "A-1", "qty": 2}, {"sku": "<i>B-2</i>", "qty": 1}],
            "_comment": "gift"
        })
    );
}

#[test]
fn test_sanitize_idempotent_on_mixed_payload() {
    let input = json!({
        "q": "Tom & Jerry <3 <a href=\"javascript:x()\">go</a>",
        "$set": {"profile.role": "admin", "bio": "<p onclick=\"x\">hi</p>"},
        "list": ["<script>", "</script>", "<<>>"]
    });

    let once = sanitize(input);
    assert_eq!(sanitize(once.clone()), once);
}

#[test]
fn test_preformatted_block_stable_across_passes() {
    let once = sanitize(json!({"note": "<pre>\n\nbody</pre>"}));
    let twice = sanitize(once.clone());

    assert_eq!(twice, once);
    assert_eq!(sanitize(twice.clone()), twice);
}
