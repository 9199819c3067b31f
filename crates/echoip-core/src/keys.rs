//! Required-key constraints on the info returned with an address
//!
//! A caller asking for info can say which fields it needs. Each requirement
//! is either a single key that must be present, or a group of alternatives
//! where any one member is enough:
//!
//! ```rust
//! use echoip_core::{InfoMap, RequiredKeys};
//!
//! let required = RequiredKeys::new()
//!     .key("countryCode")
//!     .any_of(["city", "regionName"]);
//!
//! let mut info = InfoMap::new();
//! info.insert("countryCode".into(), "US".into());
//! assert!(!required.is_satisfied_by(&info));
//!
//! info.insert("regionName".into(), "Oregon".into());
//! assert!(required.is_satisfied_by(&info));
//! ```

use crate::traits::InfoMap;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A single requirement on an info mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyRequirement {
    /// This key must be present
    Key(String),
    /// At least one of these keys must be present
    AnyOf(Vec<String>),
}

impl KeyRequirement {
    /// Check the requirement against an info mapping
    pub fn is_satisfied_by(&self, info: &InfoMap) -> bool {
        match self {
            KeyRequirement::Key(key) => info.contains_key(key),
            KeyRequirement::AnyOf(keys) => keys.iter().any(|key| info.contains_key(key)),
        }
    }
}

/// Ordered list of requirements, all of which must hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequiredKeys(Vec<KeyRequirement>);

impl RequiredKeys {
    /// No requirements (satisfied by any mapping)
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `key` to be present
    pub fn key(mut self, key: impl Into<String>) -> Self {
        self.0.push(KeyRequirement::Key(key.into()));
        self
    }

    /// Require at least one of `keys` to be present
    pub fn any_of<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        self.0
            .push(KeyRequirement::AnyOf(keys.into_iter().map(Into::into).collect()));
        self
    }

    /// Append a requirement
    pub fn push(&mut self, requirement: KeyRequirement) {
        self.0.push(requirement);
    }

    /// Check every requirement against an info mapping
    pub fn is_satisfied_by(&self, info: &InfoMap) -> bool {
        self.0.iter().all(|requirement| requirement.is_satisfied_by(info))
    }

    /// Iterate over the requirements in order
    pub fn iter(&self) -> impl Iterator<Item = &KeyRequirement> {
        self.0.iter()
    }

    /// Number of requirements
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no requirements
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<K> for RequiredKeys {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        Self(iter.into_iter().map(|k| KeyRequirement::Key(k.into())).collect())
    }
}

/// Parses `a,b|c` as "key a, and one of b or c"
impl FromStr for RequiredKeys {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut required = RequiredKeys::new();

        for item in s.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let keys: Vec<&str> = item
                .split('|')
                .map(str::trim)
                .filter(|key| !key.is_empty())
                .collect();

            if keys.is_empty() {
                return Err(crate::Error::config(format!(
                    "Empty key group in required keys: '{s}'"
                )));
            }

            required = if keys.len() == 1 && !item.contains('|') {
                required.key(keys[0])
            } else {
                required.any_of(keys)
            };
        }

        Ok(required)
    }
}

/// Whether `info` meets `required` (no requirement is always met)
pub fn satisfies(info: &InfoMap, required: Option<&RequiredKeys>) -> bool {
    required.is_none_or(|required| required.is_satisfied_by(info))
}
