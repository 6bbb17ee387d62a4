//! Nested, key-based view of a configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// The active state keys as a tree.
///
/// A compound node whose active child is a leaf is rendered as that child's
/// key; otherwise nodes become maps from child key to the child's value.
/// Parallel nodes always render as maps with one entry per region.
///
/// # Example
///
/// ```rust
/// use harel::core::StateValue;
/// use std::collections::BTreeMap;
///
/// let value = StateValue::Branch(BTreeMap::from([(
///     "green".to_string(),
///     StateValue::Leaf("walk".to_string()),
/// )]));
///
/// assert!(value.matches("green"));
/// assert!(value.matches("green.walk"));
/// assert!(!value.matches("green.wait"));
/// assert_eq!(value.to_string(), "green.walk");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StateValue {
    Leaf(String),
    Branch(BTreeMap<String, StateValue>),
}

impl StateValue {
    /// Check a dotted key path, e.g. `"green.walk"`, against the value.
    ///
    /// A path matches when it is a prefix of some active branch.
    pub fn matches(&self, path: &str) -> bool {
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        self.matches_segments(&segments)
    }

    fn matches_segments(&self, segments: &[&str]) -> bool {
        let Some((head, rest)) = segments.split_first() else {
            return true;
        };
        match self {
            Self::Leaf(key) => rest.is_empty() && key == head,
            Self::Branch(children) => children
                .get(*head)
                .is_some_and(|child| child.matches_segments(rest)),
        }
    }
}

impl fmt::Display for StateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leaf(key) => f.write_str(key),
            Self::Branch(children) => {
                if children.len() == 1 {
                    if let Some((key, child)) = children.iter().next() {
                        return match child {
                            Self::Branch(grand) if grand.is_empty() => f.write_str(key),
                            _ => write!(f, "{key}.{child}"),
                        };
                    }
                }
                f.write_str("{")?;
                for (i, (key, child)) in children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key}: {child}")?;
                }
                f.write_str("}")
            }
        }
    }
}
