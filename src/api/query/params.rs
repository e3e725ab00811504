//! Typed resource path with OData query parameters
//!
//! Parameters keep their raw (already encoded) text so a query string can be
//! re-emitted exactly as the caller wrote it; only names are decoded, and only
//! for matching.

use crate::api::constants::params;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
struct QueryParam {
    raw_key: String,
    raw_value: Option<String>,
}

impl QueryParam {
    fn parse(segment: &str) -> Self {
        match segment.split_once('=') {
            Some((key, value)) => Self {
                raw_key: key.to_string(),
                raw_value: Some(value.to_string()),
            },
            None => Self {
                raw_key: segment.to_string(),
                raw_value: None,
            },
        }
    }

    fn is_named(&self, name: &str) -> bool {
        decode(&self.raw_key).eq_ignore_ascii_case(name)
    }

    fn decoded_value(&self) -> Option<String> {
        self.raw_value.as_deref().map(|v| decode(&v.replace('+', " ")).into_owned())
    }
}

fn decode(raw: &str) -> Cow<'_, str> {
    urlencoding::decode(raw).unwrap_or(Cow::Borrowed(raw))
}

/// A resource path plus its ordered query parameters
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ODataPath {
    path: String,
    params: Vec<QueryParam>,
}

impl ODataPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            params: Vec::new(),
        }
    }

    /// Split `path?query` into the path and its parameters
    pub fn parse(input: &str) -> Self {
        let (path, query) = match input.split_once('?') {
            Some((path, query)) => (path, query),
            None => (input, ""),
        };

        let params = query
            .split('&')
            .filter(|segment| !segment.is_empty())
            .map(QueryParam::parse)
            .collect();

        Self {
            path: path.to_string(),
            params,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.iter().any(|p| p.is_named(name))
    }

    /// Decoded value of the first parameter called `name` (case-insensitive)
    pub fn get(&self, name: &str) -> Option<String> {
        self.params
            .iter()
            .find(|p| p.is_named(name))
            .and_then(QueryParam::decoded_value)
    }

    /// `$top` as a result cap; absent, zero or unparsable means no cap
    pub fn top(&self) -> Option<usize> {
        self.get(params::TOP)
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|top| *top > 0)
    }

    /// `$skip` offset, zero when absent or unparsable
    pub fn skip(&self) -> u64 {
        self.get(params::SKIP)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(0)
    }

    /// Set `name` to an already-encoded value, replacing any previous value
    /// in place so parameter order is kept.
    pub fn set_raw(&mut self, name: &str, raw_value: impl Into<String>) {
        let raw_value = Some(raw_value.into());
        match self.params.iter().position(|p| p.is_named(name)) {
            Some(index) => {
                self.params[index].raw_value = raw_value;
                let mut seen = 0;
                self.params.retain(|p| {
                    if p.is_named(name) {
                        seen += 1;
                        seen == 1
                    } else {
                        true
                    }
                });
            }
            None => self.params.push(QueryParam {
                raw_key: name.to_string(),
                raw_value,
            }),
        }
    }

    /// Set `name` to `value`, percent-encoding the value
    pub fn set(&mut self, name: &str, value: &str) {
        self.set_raw(name, urlencoding::encode(value).into_owned());
    }

    pub fn remove(&mut self, name: &str) {
        self.params.retain(|p| !p.is_named(name));
    }

    /// Copy of this path with `$skip` set to `skip`; every other parameter is kept
    pub fn with_skip(&self, skip: u64) -> Self {
        let mut next = self.clone();
        next.set_raw(params::SKIP, skip.to_string());
        next
    }

    /// The raw query string, without the leading `?`
    pub fn query_string(&self) -> String {
        self.params
            .iter()
            .map(|p| match &p.raw_value {
                Some(value) => format!("{}={}", p.raw_key, value),
                None => p.raw_key.clone(),
            })
            .collect::<Vec<_>>()
            .join("&")
    }
}

impl fmt::Display for ODataPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            write!(f, "{}", self.path)
        } else {
            write!(f, "{}?{}", self.path, self.query_string())
        }
    }
}

impl From<&str> for ODataPath {
    fn from(input: &str) -> Self {
        Self::parse(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display_preserve_raw_text() {
        let raw = "/items?$filter=Type%20eq%20'Inventory'&$select=No,Description&$top=50";
        let path = ODataPath::parse(raw);

        assert_eq!(path.path(), "/items");
        assert_eq!(path.to_string(), raw);
        assert_eq!(path.get("$filter").as_deref(), Some("Type eq 'Inventory'"));
        assert_eq!(path.top(), Some(50));
    }

    #[test]
    fn test_no_query() {
        let path = ODataPath::parse("customers");

        assert!(!path.has_params());
        assert_eq!(path.to_string(), "customers");
        assert_eq!(path.top(), None);
        assert_eq!(path.skip(), 0);
    }

    #[test]
    fn test_with_skip_replaces_existing_skip_and_keeps_order() {
        let path = ODataPath::parse("/items?$filter=x%20gt%201&$skip=5&$orderby=No&$top=100");
        let next = path.with_skip(40);

        assert_eq!(next.to_string(), "/items?$filter=x%20gt%201&$skip=40&$orderby=No&$top=100");
        // Original untouched
        assert_eq!(path.skip(), 5);
    }

    #[test]
    fn test_with_skip_appends_when_missing() {
        let path = ODataPath::parse("/items?$select=No");
        assert_eq!(path.with_skip(20).to_string(), "/items?$select=No&$skip=20");
        assert_eq!(ODataPath::parse("/items").with_skip(20).to_string(), "/items?$skip=20");
    }

    #[test]
    fn test_names_match_encoded_and_case_insensitive() {
        let path = ODataPath::parse("/items?%24top=3&$SKIP=7");

        assert_eq!(path.top(), Some(3));
        assert_eq!(path.skip(), 7);
        assert!(path.contains("$skip"));
    }

    #[test]
    fn test_duplicate_params_collapse_on_set() {
        let mut path = ODataPath::parse("/items?$skip=1&$top=2&$skip=3");
        path.set_raw("$skip", "9");

        assert_eq!(path.to_string(), "/items?$skip=9&$top=2");
    }

    #[test]
    fn test_invalid_top_is_ignored() {
        assert_eq!(ODataPath::parse("/items?$top=abc").top(), None);
        assert_eq!(ODataPath::parse("/items?$top=0").top(), None);
        assert_eq!(ODataPath::parse("/items?$top=%2012").top(), Some(12));
    }

    #[test]
    fn test_set_encodes_value_and_remove() {
        let mut path = ODataPath::new("/customers");
        path.set("$filter", "City eq 'Milano'");
        path.set_raw("$count", "true");
        assert_eq!(path.to_string(), "/customers?$filter=City%20eq%20%27Milano%27&$count=true");

        path.remove("$filter");
        assert_eq!(path.to_string(), "/customers?$count=true");
    }
}
