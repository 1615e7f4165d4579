//! Field paths into a state tree.
//!
//! A path is a sequence of segments: a field name or a row index inside a
//! table. Paths render as `srcintf[1].name` and are carried by every
//! engine error so failures point at the exact field.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// A single segment in a field path.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Seg {
    /// Field access by state name.
    Key(String),
    /// Row access inside a table field.
    Index(usize),
}

/// A complete path from the root of a state tree.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldPath(Vec<Seg>);

impl FieldPath {
    /// The empty path (the tree itself).
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Extend with a field name.
    pub fn key(&self, name: impl Into<String>) -> Self {
        let mut segs = self.0.clone();
        segs.push(Seg::Key(name.into()));
        Self(segs)
    }

    /// Extend with a row index.
    pub fn index(&self, idx: usize) -> Self {
        let mut segs = self.0.clone();
        segs.push(Seg::Index(idx));
        Self(segs)
    }

    pub fn segments(&self) -> &[Seg] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Split into parent path and final segment.
    pub fn split_last(&self) -> Option<(FieldPath, &Seg)> {
        let (last, parent) = self.0.split_last()?;
        Some((Self(parent.to_vec()), last))
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<root>");
        }
        for (i, seg) in self.0.iter().enumerate() {
            match seg {
                Seg::Key(k) if i == 0 => write!(f, "{k}")?,
                Seg::Key(k) => write!(f, ".{k}")?,
                Seg::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

impl FromStr for FieldPath {
    type Err = CoreError;

    /// Parse `a.b[2].c` notation.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| CoreError::InvalidPath {
            raw: s.into(),
            reason: reason.into(),
        };

        let mut segs = Vec::new();
        for part in s.split('.') {
            let (name, mut rest) = match part.find('[') {
                Some(pos) => (&part[..pos], &part[pos..]),
                None => (part, ""),
            };
            if name.is_empty() {
                return Err(invalid("empty field name"));
            }
            segs.push(Seg::Key(name.to_owned()));

            while !rest.is_empty() {
                let close = rest.find(']').ok_or_else(|| invalid("unclosed '['"))?;
                let idx = rest[1..close]
                    .parse::<usize>()
                    .map_err(|_| invalid("row index must be a non-negative integer"))?;
                segs.push(Seg::Index(idx));
                rest = &rest[close + 1..];
                if !rest.is_empty() && !rest.starts_with('[') {
                    return Err(invalid("unexpected text after ']'"));
                }
            }
        }
        Ok(Self(segs))
    }
}
