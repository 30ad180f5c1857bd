//! Header storage: an ordered, case-insensitive name/value multimap.
//!
//! Grounded on the teacher's `Header`/`add_header` pair (a single parsed line plus
//! a dedup-on-insert helper), generalized here into a small owned multimap since
//! the core needs to merge session defaults, request options, and auth/cookie
//! headers before serialization (spec §4.4, §6).

use std::fmt;

/// One `name: value` pair. Comparisons on `name` are case-insensitive per RFC 7230.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    name: String,
    value: String,
}

impl Header {
    /// Construct a header, preserving the given casing for serialization.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Header {
            name: name.into(),
            value: value.into(),
        }
    }

    /// The header name as given.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The header value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Whether this header's name matches `other`, ignoring case.
    pub fn is_name(&self, other: &str) -> bool {
        self.name.eq_ignore_ascii_case(other)
    }
}

/// An ordered collection of headers with case-insensitive lookup.
///
/// Insertion order is preserved for serialization (spec §4.4: header lines are
/// emitted in the order assembled). `set` replaces any existing header of the
/// same name (single-value semantics); `append` adds a value alongside any
/// existing ones, for headers like `Cookie` that are built additively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderMap {
    entries: Vec<Header>,
}

impl HeaderMap {
    /// An empty header map.
    pub fn new() -> Self {
        HeaderMap::default()
    }

    /// Number of header entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up the first value for `name`, case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|h| h.is_name(name))
            .map(|h| h.value())
    }

    /// Whether a header named `name` is present.
    pub fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|h| h.is_name(name))
    }

    /// Replace (or insert) the single value for `name`.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries.retain(|h| !h.is_name(&name));
        self.entries.push(Header::new(name, value));
    }

    /// Append a value for `name`, keeping any prior values under the same name.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push(Header::new(name, value));
    }

    /// Remove every header named `name`. Returns whether anything was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|h| !h.is_name(name));
        before != self.entries.len()
    }

    /// Iterate headers in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.entries.iter()
    }

    /// Merge `other` into `self`. For each name present in `other`, any
    /// existing entries under that name in `self` are replaced (override
    /// semantics, matching spec §6: "additive unless a name is already
    /// present in session defaults — the option overrides").
    pub fn merge_override(&mut self, other: &HeaderMap) {
        for h in other.iter() {
            self.set(h.name().to_string(), h.value().to_string());
        }
    }
}

impl fmt::Display for HeaderMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for h in &self.entries {
            writeln!(f, "{}: {}", h.name(), h.value())?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a HeaderMap {
    type Item = &'a Header;
    type IntoIter = std::slice::Iter<'a, Header>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_case_insensitively() {
        let mut h = HeaderMap::new();
        h.set("Content-Type", "text/plain");
        h.set("content-type", "application/json");
        assert_eq!(h.len(), 1);
        assert_eq!(h.get("CONTENT-TYPE"), Some("application/json"));
    }

    #[test]
    fn append_keeps_both() {
        let mut h = HeaderMap::new();
        h.append("X-Thing", "a");
        h.append("X-Thing", "b");
        assert_eq!(h.len(), 2);
    }

    #[test]
    fn merge_override_replaces_defaults_only_for_named_headers() {
        let mut defaults = HeaderMap::new();
        defaults.set("User-Agent", "reqflow/0.1");
        defaults.set("Accept", "*/*");

        let mut options = HeaderMap::new();
        options.set("User-Agent", "custom/1.0");

        defaults.merge_override(&options);
        assert_eq!(defaults.get("user-agent"), Some("custom/1.0"));
        assert_eq!(defaults.get("accept"), Some("*/*"));
    }
}
