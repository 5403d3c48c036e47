//! Issue fingerprints: order-independent, deduplicated issue-id sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IssueFingerprint(BTreeSet<String>);

impl IssueFingerprint {
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(ids.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Ids present here but not in `previous`
    pub fn introduced_since<'a>(&'a self, previous: &'a Self) -> impl Iterator<Item = &'a str> {
        self.0.difference(&previous.0).map(String::as_str)
    }
}

impl IntoIterator for IssueFingerprint {
    type Item = String;
    type IntoIter = std::collections::btree_set::IntoIter<String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl std::fmt::Display for IssueFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", id)?;
        }
        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_and_duplicates_ignored() {
        let a = IssueFingerprint::from_ids(["b", "a", "a"]);
        let b = IssueFingerprint::from_ids(["a", "b"]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.to_string(), "{a, b}");
    }

    #[test]
    fn test_introduced_since() {
        let prev = IssueFingerprint::from_ids(["a"]);
        let next = IssueFingerprint::from_ids(["a", "c"]);
        assert_eq!(next.introduced_since(&prev).collect::<Vec<_>>(), vec!["c"]);
        assert_eq!(prev.introduced_since(&next).count(), 0);
    }
}
