//! Query keys.
//!
//! A [`QueryKey`] is an ordered, immutable tuple of scalar segments. Two keys
//! are equal iff all segments are equal and in order; prefix matching compares
//! a leading sub-tuple.

mod hash;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use hash::fingerprint;

/// A single scalar key segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeySegment {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl fmt::Display for KeySegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeySegment::Bool(b) => write!(f, "{b}"),
            KeySegment::Int(i) => write!(f, "{i}"),
            KeySegment::Str(s) => write!(f, "{s:?}"),
        }
    }
}

impl From<&str> for KeySegment {
    fn from(s: &str) -> Self {
        KeySegment::Str(s.to_string())
    }
}

impl From<String> for KeySegment {
    fn from(s: String) -> Self {
        KeySegment::Str(s)
    }
}

impl From<i64> for KeySegment {
    fn from(i: i64) -> Self {
        KeySegment::Int(i)
    }
}

impl From<u32> for KeySegment {
    fn from(i: u32) -> Self {
        KeySegment::Int(i64::from(i))
    }
}

impl From<bool> for KeySegment {
    fn from(b: bool) -> Self {
        KeySegment::Bool(b)
    }
}

/// Ordered, immutable identifier of a query.
///
/// Cloning is cheap; segments are shared.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Arc<[KeySegment]>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<KeySegment>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `prefix` is a leading sub-tuple of this key.
    ///
    /// Every key starts with itself and with the empty key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// A new key with one more trailing segment.
    pub fn child(&self, segment: impl Into<KeySegment>) -> Self {
        let mut segments = self.0.to_vec();
        segments.push(segment.into());
        Self(segments.into())
    }

    /// Stable hex digest of the key, used to identify keys in logs.
    pub fn fingerprint(&self) -> String {
        fingerprint(self)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{segment}")?;
        }
        f.write_str("]")
    }
}

/// Build a [`QueryKey`] from heterogeneous segments.
///
/// ```
/// use synq_core::query_key;
/// let key = query_key!["communities", "detail", 7i64];
/// assert_eq!(key.len(), 3);
/// ```
#[macro_export]
macro_rules! query_key {
    ($($segment:expr),* $(,)?) => {
        $crate::key::QueryKey::new(::std::vec![$($crate::key::KeySegment::from($segment)),*])
    };
}
