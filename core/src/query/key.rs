use std::fmt;

use serde::Serialize;

/// Identifies one cached result: the operation (`scope`) plus its serialized
/// parameters. Two reads with equal keys share one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    scope: &'static str,
    params: String,
}

impl QueryKey {
    pub fn new(scope: &'static str, params: impl Into<String>) -> Self {
        Self {
            scope,
            params: params.into(),
        }
    }

    /// Key for a parameterless operation.
    pub fn scope(scope: &'static str) -> Self {
        Self::new(scope, String::new())
    }

    /// Key whose parameters are the JSON form of `params`. Struct fields
    /// serialize in declaration order, so equal values give equal keys.
    pub fn with_params<P: Serialize>(scope: &'static str, params: &P) -> Self {
        let params = serde_json::to_string(params).unwrap_or_default();
        Self::new(scope, params)
    }

    pub fn scope_name(&self) -> &'static str {
        self.scope
    }

    pub fn params(&self) -> &str {
        &self.params
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.params.is_empty() {
            f.write_str(self.scope)
        } else {
            write!(f, "{}/{}", self.scope, self.params)
        }
    }
}

/// Which entries an invalidation touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyMatch {
    /// Exactly this key.
    Exact(QueryKey),
    /// Every key of this scope, whatever its parameters.
    Scope(&'static str),
}

impl KeyMatch {
    pub fn matches(&self, key: &QueryKey) -> bool {
        match self {
            KeyMatch::Exact(exact) => exact == key,
            KeyMatch::Scope(scope) => key.scope == *scope,
        }
    }
}

impl From<QueryKey> for KeyMatch {
    fn from(key: QueryKey) -> Self {
        KeyMatch::Exact(key)
    }
}
