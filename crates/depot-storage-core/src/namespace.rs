use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StorageError;

/// Logical collections that partition records and files.
///
/// Each namespace is a disjoint key space: a `(namespace, uuid)` pair
/// addresses exactly one record or file, and the same uuid in two
/// namespaces names two unrelated items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Projects,
    Fragments,
}

impl Namespace {
    /// All registered namespaces.
    pub const ALL: [Namespace; 2] = [Namespace::Projects, Namespace::Fragments];

    /// The wire/key form of the namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Projects => "projects",
            Namespace::Fragments => "fragments",
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Namespace {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Namespace::ALL
            .into_iter()
            .find(|ns| ns.as_str() == s)
            .ok_or_else(|| StorageError::Validation(format!("unknown namespace: {}", s)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        for ns in Namespace::ALL {
            assert_eq!(ns.as_str().parse::<Namespace>().unwrap(), ns);
        }
    }

    #[test]
    fn test_unknown_namespace() {
        let err = "sessions".parse::<Namespace>().unwrap_err();
        assert!(matches!(err, StorageError::Validation(_)));
    }

    #[test]
    fn test_serde_form_matches_key_form() {
        let json = serde_json::to_string(&Namespace::Fragments).unwrap();
        assert_eq!(json, "\"fragments\"");
    }
}
