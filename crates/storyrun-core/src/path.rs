//! Hierarchical addresses for suites and tests.
//!
//! A [`PathAddress`] is an immutable, slash-delimited sequence of segments.
//! The empty sequence is the root of a hierarchy; a single segment names a
//! node directly under the root.
//!
//! ```
//! use storyrun_core::path::PathAddress;
//!
//! let path: PathAddress = "Accounts/Deposits/Large deposit".parse().unwrap();
//! assert_eq!(path.name(), Some("Large deposit"));
//! assert_eq!(path.parent().to_string(), "Accounts/Deposits");
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Segment delimiter for path text.
pub const DELIMITER: char = '/';

/// Errors raised while parsing path text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    /// A segment between delimiters was empty or only whitespace.
    #[error("malformed path '{text}': segment {index} is empty")]
    EmptySegment { text: String, index: usize },

    /// A segment passed to [`PathAddress::from_segments`] contained the delimiter.
    #[error("malformed path segment '{segment}': contains '/'")]
    DelimiterInSegment { segment: String },
}

/// Immutable hierarchical address of a suite or test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PathAddress {
    segments: Vec<String>,
}

impl PathAddress {
    /// The root address (no segments).
    pub fn root() -> Self {
        PathAddress::default()
    }

    /// Parse slash-delimited path text.
    ///
    /// Surrounding whitespace is ignored and empty text is the root. Every
    /// segment must contain at least one non-whitespace character.
    pub fn parse(text: &str) -> Result<Self, PathError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Ok(PathAddress::root());
        }

        let mut segments = Vec::new();
        for (index, segment) in trimmed.split(DELIMITER).enumerate() {
            let segment = segment.trim();
            if segment.is_empty() {
                return Err(PathError::EmptySegment {
                    text: text.to_string(),
                    index,
                });
            }
            segments.push(segment.to_string());
        }

        Ok(PathAddress { segments })
    }

    /// Build an address from already-split segments.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut collected = Vec::new();
        for (index, segment) in segments.into_iter().enumerate() {
            let segment = segment.into();
            if segment.contains(DELIMITER) {
                return Err(PathError::DelimiterInSegment { segment });
            }
            if segment.trim().is_empty() {
                return Err(PathError::EmptySegment {
                    text: segment,
                    index,
                });
            }
            collected.push(segment);
        }
        Ok(PathAddress {
            segments: collected,
        })
    }

    /// All segments, root first.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Number of segments.
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, `None` for the root.
    pub fn name(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }

    /// True for the empty address.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// True when the address names a node directly under the root.
    pub fn is_leaf_under_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// Address with the last segment removed. The parent of the root is the root.
    pub fn parent(&self) -> PathAddress {
        let mut segments = self.segments.clone();
        segments.pop();
        PathAddress { segments }
    }

    /// Address of a child named `name` under this one.
    pub fn child(&self, name: &str) -> Result<PathAddress, PathError> {
        let mut segments = self.segments.clone();
        segments.push(name.to_string());
        PathAddress::from_segments(segments)
    }

    /// Append an already-validated segment.
    pub(crate) fn join(&self, segment: &str) -> PathAddress {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        PathAddress { segments }
    }

    /// True when `self` is `other` or one of its ancestors.
    pub fn contains(&self, other: &PathAddress) -> bool {
        other.segments.starts_with(&self.segments)
    }
}

impl fmt::Display for PathAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", DELIMITER)?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

impl FromStr for PathAddress {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PathAddress::parse(s)
    }
}

impl TryFrom<String> for PathAddress {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        PathAddress::parse(&value)
    }
}

impl From<PathAddress> for String {
    fn from(path: PathAddress) -> Self {
        path.to_string()
    }
}
