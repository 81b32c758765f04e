//! Recursive sanitization of untyped request payloads.
//!
//! Payloads are `serde_json::Value` trees. Two independent transforms walk
//! them by structural recursion:
//!
//! - [`KeyGuard`] rewrites mapping keys that could be read as MongoDB query
//!   operators (`$where`, `$gt`) or dotted field paths (`a.b`). Values and
//!   array positions are never touched.
//! - [`strip_markup`] passes every string leaf through an HTML sanitizer that
//!   drops `<script>`/`<style>` elements with their content, event handler
//!   attributes and `javascript:` URLs, keeping safe markup and text.
//!
//! Numbers, booleans and null pass through both transforms unchanged, and
//! containers keep their kind, order and length. Both transforms are
//! idempotent, so [`sanitize`] applied twice equals [`sanitize`] applied once.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use storefront_gateway::sanitize::sanitize;
//!
//! let clean = sanitize(json!({
//!     "$where": "malicious",
//!     "name": "<script>alert(1)</script>Shoe",
//! }));
//!
//! assert_eq!(clean, json!({"_where": "malicious", "name": "Shoe"}));
//! ```

use std::borrow::Cow;
use std::collections::HashSet;
use std::sync::LazyLock;

use serde_json::{Map, Value};

/// Leading character of MongoDB query operators.
pub const OPERATOR_PREFIX: char = '$';

/// Separator MongoDB interprets as a nested field path.
pub const PATH_SEPARATOR: char = '.';

/// Character substituted for the two above.
pub const REPLACEMENT: char = '_';

/// Apply both transforms: operator-key rewriting and markup stripping.
pub fn sanitize(value: Value) -> Value {
    let (value, _) = KeyGuard::default().apply(value);
    strip_markup(value)
}

/// Rewrites mapping keys that could be interpreted as query operators.
///
/// A key starting with the operator prefix has that first character
/// replaced; every path separator in a key is replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyGuard {
    operator_prefix: char,
    path_separator: char,
    replacement: char,
}

impl Default for KeyGuard {
    fn default() -> Self {
        Self {
            operator_prefix: OPERATOR_PREFIX,
            path_separator: PATH_SEPARATOR,
            replacement: REPLACEMENT,
        }
    }
}

impl KeyGuard {
    /// Create a guard with custom characters.
    ///
    /// The replacement must differ from both guarded characters, otherwise
    /// the rewrite would not remove them.
    pub fn new(operator_prefix: char, path_separator: char, replacement: char) -> Option<Self> {
        if replacement == operator_prefix || replacement == path_separator {
            return None;
        }
        Some(Self {
            operator_prefix,
            path_separator,
            replacement,
        })
    }

    /// Rewrite every unsafe key in the tree.
    ///
    /// Returns the cleaned tree and the number of keys rewritten.
    pub fn apply(&self, value: Value) -> (Value, usize) {
        let mut rewritten = 0;
        let value = self.walk(value, &mut rewritten);
        (value, rewritten)
    }

    /// Rewrite a single key. Borrowed when the key is already safe.
    pub fn clean_key<'a>(&self, key: &'a str) -> Cow<'a, str> {
        let stripped = key.strip_prefix(self.operator_prefix);
        if stripped.is_none() && !key.contains(self.path_separator) {
            return Cow::Borrowed(key);
        }

        let mut clean = String::with_capacity(key.len());
        let rest = match stripped {
            Some(rest) => {
                clean.push(self.replacement);
                rest
            }
            None => key,
        };
        clean.extend(rest.chars().map(|c| {
            if c == self.path_separator {
                self.replacement
            } else {
                c
            }
        }));
        Cow::Owned(clean)
    }

    /// The replacement for `key`, or `None` when it is already safe.
    pub fn rewrite(&self, key: &str) -> Option<String> {
        match self.clean_key(key) {
            Cow::Borrowed(_) => None,
            Cow::Owned(clean) => Some(clean),
        }
    }

    fn walk(&self, value: Value, rewritten: &mut usize) -> Value {
        match value {
            Value::Object(map) => Value::Object(self.walk_map(map, rewritten)),
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.walk(item, rewritten))
                    .collect(),
            ),
            scalar => scalar,
        }
    }

    /// Rewrite the keys of one mapping level.
    ///
    /// Keys that were already safe win collisions with rewritten ones; among
    /// rewritten keys the first wins. Returns the surviving entries and the
    /// number of keys rewritten.
    pub fn rewrite_entries<V>(
        &self,
        entries: impl IntoIterator<Item = (String, V)>,
    ) -> (Vec<(String, V)>, usize) {
        let mut kept = Vec::new();
        let mut renamed = Vec::new();

        for (key, value) in entries {
            match self.rewrite(&key) {
                None => kept.push((key, value)),
                Some(new_key) => renamed.push((new_key, value)),
            }
        }

        let rewritten = renamed.len();
        let mut taken: HashSet<String> = kept.iter().map(|(key, _)| key.clone()).collect();
        kept.extend(
            renamed
                .into_iter()
                .filter(|(key, _)| taken.insert(key.clone())),
        );
        (kept, rewritten)
    }

    fn walk_map(&self, map: Map<String, Value>, rewritten: &mut usize) -> Map<String, Value> {
        let walked: Vec<_> = map
            .into_iter()
            .map(|(key, value)| (key, self.walk(value, rewritten)))
            .collect();
        let (entries, count) = self.rewrite_entries(walked);
        *rewritten += count;
        entries.into_iter().collect()
    }
}

/// Clean every string leaf of an HTML fragment's executable content.
pub fn strip_markup(value: Value) -> Value {
    match value {
        Value::String(text) => Value::String(clean_html(&text)),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_markup).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (key, strip_markup(value)))
                .collect(),
        ),
        scalar => scalar,
    }
}

/// Elements whose parse drops a leading newline. Re-parsing their output
/// would keep shrinking it, so they are unwrapped to their text instead.
const NEWLINE_EATING_TAGS: [&str; 3] = ["pre", "textarea", "listing"];

/// Upper bound on cleaning passes before the output is accepted.
const MAX_CLEAN_PASSES: usize = 4;

static HTML_POLICY: LazyLock<ammonia::Builder<'static>> = LazyLock::new(|| {
    let mut builder = ammonia::Builder::default();
    builder.rm_tags(NEWLINE_EATING_TAGS);
    builder
});

/// Sanitize a single string with the gateway's HTML policy.
///
/// The result is a fixed point: cleaning it again returns it unchanged.
pub fn clean_html(text: &str) -> String {
    // Skip the parser for the common case of plain text with nothing to
    // escape or remove.
    if !text.contains(['<', '>', '&']) {
        return text.to_string();
    }

    let mut clean = HTML_POLICY.clean(text).to_string();
    for _ in 1..MAX_CLEAN_PASSES {
        let next = HTML_POLICY.clean(&clean).to_string();
        if next == clean {
            break;
        }
        clean = next;
    }
    clean
}
