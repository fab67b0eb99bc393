//! Path matching for anonymous routes.
//!
//! # Design Decisions
//! - Prefixes match on segment boundaries: `/login` matches `/login` and
//!   `/login/sso` but not `/loginx`
//! - Matching is case-sensitive
//! - No regex to guarantee O(n) matching

/// Matches a path relative to its service against a set of prefixes.
#[derive(Debug, Clone, Default)]
pub struct PathPrefixMatcher {
    prefixes: Vec<String>,
}

impl PathPrefixMatcher {
    pub fn new<I, S>(prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            prefixes: prefixes
                .into_iter()
                .map(|p| normalize(p.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    pub fn matches(&self, path: &str) -> bool {
        let path = normalize(path);
        self.prefixes.iter().any(|prefix| {
            prefix == "/"
                || path == *prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Leading slash, no trailing slash (except for the root itself).
fn normalize(path: &str) -> String {
    let trimmed = path.trim_matches('/');
    format!("/{trimmed}")
}
