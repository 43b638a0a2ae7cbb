//! Locus addressing: dotted-integer paths into a dialogue's address tree.
//!
//! Ancestry is a pure string operation on the canonical path form, so
//! justification back-references never need an in-memory pointer graph.

use serde::{Deserialize, Serialize};

/// Path of the root locus of every dialogue.
pub const ROOT_PATH: &str = "0";

/// Error for malformed locus paths.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocusError {
    #[error("empty locus path")]
    Empty,

    #[error("empty segment in locus path {0:?}")]
    EmptySegment(String),

    #[error("invalid character {ch:?} in locus path {path:?}")]
    InvalidChar { path: String, ch: char },

    #[error("locus path {0:?} is not rooted at \"0\"")]
    Unrooted(String),
}

/// A canonical dotted locus path such as `0.1.2`.
///
/// Segments are non-empty and may contain alphanumerics, `_` and `-`
/// (explicit child suffixes are free-form labels, not just integers).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LocusPath(String);

impl LocusPath {
    /// The dialogue root, `0`.
    pub fn root() -> Self {
        Self(ROOT_PATH.to_string())
    }

    /// Parse and validate a path, trimming surrounding whitespace.
    ///
    /// The first segment must be the root, so every path hangs off `0`.
    pub fn parse(raw: &str) -> Result<Self, LocusError> {
        let path = raw.trim();
        if path.is_empty() {
            return Err(LocusError::Empty);
        }
        for segment in path.split('.') {
            if segment.is_empty() {
                return Err(LocusError::EmptySegment(path.to_string()));
            }
            if let Some(ch) = segment
                .chars()
                .find(|c| !(c.is_alphanumeric() || *c == '_' || *c == '-'))
            {
                return Err(LocusError::InvalidChar {
                    path: path.to_string(),
                    ch,
                });
            }
        }
        if path.split('.').next() != Some(ROOT_PATH) {
            return Err(LocusError::Unrooted(path.to_string()));
        }
        Ok(Self(path.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parent path, or `None` for a single-segment path.
    pub fn parent(&self) -> Option<LocusPath> {
        self.0
            .rsplit_once('.')
            .map(|(parent, _)| LocusPath(parent.to_string()))
    }

    /// Last segment (the child label under the parent).
    pub fn last_segment(&self) -> &str {
        self.0.rsplit_once('.').map(|(_, s)| s).unwrap_or(self.0.as_str())
    }

    /// Child path with the given label. The label must be a single segment.
    pub fn child(&self, label: &str) -> Result<LocusPath, LocusError> {
        LocusPath::parse(&format!("{}.{}", self.0, label.trim()))
    }

    /// Number of segments; the root has depth 1.
    pub fn depth(&self) -> usize {
        self.0.split('.').count()
    }

    /// Whether `self` equals `other` or is an ancestor of it.
    pub fn is_prefix_of(&self, other: &LocusPath) -> bool {
        other.0 == self.0
            || (other.0.len() > self.0.len()
                && other.0.starts_with(&self.0)
                && other.0.as_bytes()[self.0.len()] == b'.')
    }

    /// Whether `self` equals `other` or is nested beneath it.
    pub fn is_under(&self, other: &LocusPath) -> bool {
        other.is_prefix_of(self)
    }

    /// Every proper ancestor, root first.
    pub fn ancestors(&self) -> Vec<LocusPath> {
        let mut out = Vec::new();
        let mut current = self.parent();
        while let Some(p) = current {
            current = p.parent();
            out.push(p);
        }
        out.reverse();
        out
    }
}

impl std::fmt::Display for LocusPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for LocusPath {
    type Err = LocusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LocusPath::parse(s)
    }
}

impl TryFrom<String> for LocusPath {
    type Error = LocusError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        LocusPath::parse(&value)
    }
}

impl From<LocusPath> for String {
    fn from(value: LocusPath) -> Self {
        value.0
    }
}
