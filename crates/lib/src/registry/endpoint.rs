//! Endpoint entitlement patterns.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::RegistryError;

/// An endpoint a client may reach.
///
/// Either an exact path (`/telemetry/c1_data`) or a subtree ending in `/*`
/// (`/files/c1/*`), which matches any path strictly below the prefix.
/// Paths containing empty, `.` or `..` segments never match anything.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum EndpointPattern {
    Exact(String),
    /// Stored with its trailing `/`
    Subtree(String),
}

impl EndpointPattern {
    pub fn parse(pattern: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.to_string(),
        };

        if !pattern.starts_with('/') {
            return Err(invalid("must start with '/'"));
        }

        if let Some(prefix) = pattern.strip_suffix("/*") {
            if prefix.contains('*') {
                return Err(invalid("'*' is only allowed as the final segment"));
            }
            if !prefix.is_empty() && !is_canonical_path(prefix) {
                return Err(invalid("path is not canonical"));
            }
            return Ok(EndpointPattern::Subtree(format!("{prefix}/")));
        }

        if pattern.contains('*') {
            return Err(invalid("'*' is only allowed as the final segment"));
        }
        if !is_canonical_path(pattern) {
            return Err(invalid("path is not canonical"));
        }
        Ok(EndpointPattern::Exact(pattern.to_string()))
    }

    /// Parse a comma-separated list such as `"/telemetry/a,/files/a/*"`.
    /// Empty items are skipped.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, RegistryError> {
        list.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(Self::parse)
            .collect()
    }

    /// A concrete path this pattern matches, used for connection tests.
    pub fn sample_path(&self) -> String {
        match self {
            EndpointPattern::Exact(path) => path.clone(),
            EndpointPattern::Subtree(prefix) => format!("{prefix}check"),
        }
    }

    pub fn matches(&self, endpoint: &str) -> bool {
        if !is_canonical_path(endpoint) {
            return false;
        }
        match self {
            EndpointPattern::Exact(path) => endpoint == path,
            EndpointPattern::Subtree(prefix) => {
                endpoint.len() > prefix.len() && endpoint.starts_with(prefix.as_str())
            }
        }
    }
}

fn is_canonical_path(path: &str) -> bool {
    match path.strip_prefix('/') {
        Some(rest) => rest
            .split('/')
            .all(|segment| !segment.is_empty() && segment != "." && segment != ".."),
        None => false,
    }
}

impl fmt::Display for EndpointPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointPattern::Exact(path) => f.write_str(path),
            EndpointPattern::Subtree(prefix) => write!(f, "{prefix}*"),
        }
    }
}

impl TryFrom<String> for EndpointPattern {
    type Error = RegistryError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EndpointPattern> for String {
    fn from(pattern: EndpointPattern) -> Self {
        pattern.to_string()
    }
}
