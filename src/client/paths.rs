// SPDX-License-Identifier: MIT OR Apache-2.0

//! Named route table.

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use std::collections::HashMap;

/// Everything except RFC 3986 unreserved characters.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Immutable map from a logical operation name to a route template such as
/// `/users/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathRegistry {
    paths: HashMap<String, String>,
}

impl PathRegistry {
    #[must_use]
    pub fn new(paths: HashMap<String, String>) -> Self {
        Self { paths }
    }

    /// Look up the template registered under `name`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.paths.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    /// Iterate over registered route names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.paths.keys().map(String::as_str)
    }
}

impl<K, V> FromIterator<(K, V)> for PathRegistry
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            paths: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Substitute `{name}` placeholders with percent-encoded path parameter
/// values.
///
/// Placeholders without a matching parameter are left untouched.
pub(crate) fn expand(template: &str, params: &[(String, String)]) -> String {
    params.iter().fold(template.to_string(), |path, (name, value)| {
        path.replace(&format!("{{{name}}}"), &escape_segment(value))
    })
}

fn escape_segment(value: &str) -> String {
    utf8_percent_encode(value, PATH_SEGMENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_registered_route() {
        let registry: PathRegistry = [("getUser", "/users/{id}")].into_iter().collect();
        assert_eq!(registry.resolve("getUser"), Some("/users/{id}"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_unknown_route() {
        let registry = PathRegistry::default();
        assert!(registry.is_empty());
        assert_eq!(registry.resolve("missing"), None);
    }

    #[test]
    fn test_expand_params() {
        let params = vec![
            ("org".to_string(), "acme".to_string()),
            ("id".to_string(), "42".to_string()),
        ];
        assert_eq!(
            expand("/orgs/{org}/users/{id}", &params),
            "/orgs/acme/users/42"
        );
    }

    #[test]
    fn test_expand_escapes_values() {
        let params = vec![("id".to_string(), "a b/c".to_string())];
        assert_eq!(expand("/users/{id}", &params), "/users/a%20b%2Fc");
    }

    #[test]
    fn test_expand_escapes_reserved_and_non_ascii() {
        let params = vec![("name".to_string(), "jo?#&=+é~x.y_z-1".to_string())];
        assert_eq!(
            expand("/users/{name}", &params),
            "/users/jo%3F%23%26%3D%2B%C3%A9~x.y_z-1"
        );
    }

    #[test]
    fn test_expand_leaves_unknown_placeholders() {
        let params = vec![("id".to_string(), "1".to_string())];
        assert_eq!(expand("/users/{id}/{tab}", &params), "/users/1/{tab}");
    }
}
