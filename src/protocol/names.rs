//! Provider addresses: `name` for a scope-level provider, `parent.child` for a nested one.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProviderPath {
    root: String,
    nested: Option<String>,
}

impl ProviderPath {
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            root: name.into(),
            nested: None,
        }
    }

    pub fn nested(root: impl Into<String>, child: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            nested: Some(child.into()),
        }
    }

    /// Split on the first dot. Empty segments are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.split_once('.') {
            Some((root, child)) if !root.is_empty() && !child.is_empty() => {
                Some(Self::nested(root, child))
            }
            Some(_) => None,
            None if !raw.is_empty() => Some(Self::root(raw)),
            None => None,
        }
    }

    /// Name of the scope-level provider.
    pub fn root_name(&self) -> &str {
        &self.root
    }

    pub fn child_name(&self) -> Option<&str> {
        self.nested.as_deref()
    }

    pub fn is_nested(&self) -> bool {
        self.nested.is_some()
    }
}

impl fmt::Display for ProviderPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.nested {
            Some(child) => write!(f, "{}.{}", self.root, child),
            None => f.write_str(&self.root),
        }
    }
}

impl TryFrom<String> for ProviderPath {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or_else(|| format!("invalid provider name '{}'", raw))
    }
}

impl From<ProviderPath> for String {
    fn from(path: ProviderPath) -> Self {
        path.to_string()
    }
}
