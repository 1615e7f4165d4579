// ── Dotted API versions ──
//
// Devices report versions like "v6.2.3" or "6.4.0.1803". Comparison is
// segment-wise numeric, left to right, with missing segments read as 0,
// so "6.2" == "6.2.0.0" and "6.2.10" > "6.2.9".

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CoreError;

/// Structured, comparable API version (major.minor.patch.build...).
#[derive(Debug, Clone, Serialize)]
#[serde(into = "String")]
pub struct ApiVersion {
    segments: Vec<u64>,
}

impl ApiVersion {
    /// Build a version from explicit segments.
    pub fn new(segments: impl Into<Vec<u64>>) -> Self {
        Self {
            segments: segments.into(),
        }
    }

    /// Parse a version string. Accepts an optional leading `v`/`V`.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        if body.is_empty() {
            return Err(CoreError::InvalidVersion {
                raw: raw.into(),
                reason: "empty version".into(),
            });
        }

        let segments = body
            .split('.')
            .map(|seg| {
                seg.parse::<u64>().map_err(|_| CoreError::InvalidVersion {
                    raw: raw.into(),
                    reason: format!("segment '{seg}' is not a non-negative integer"),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[u64] {
        &self.segments
    }

    fn segment(&self, idx: usize) -> u64 {
        self.segments.get(idx).copied().unwrap_or(0)
    }

    /// Number of significant segments (trailing zeros ignored).
    fn significant_len(&self) -> usize {
        self.segments
            .iter()
            .rposition(|s| *s != 0)
            .map_or(0, |idx| idx + 1)
    }
}

impl Ord for ApiVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.segments.len().max(other.segments.len());
        (0..len)
            .map(|idx| self.segment(idx).cmp(&other.segment(idx)))
            .find(|ord| ord.is_ne())
            .unwrap_or(Ordering::Equal)
    }
}

impl PartialOrd for ApiVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for ApiVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ApiVersion {}

impl Hash for ApiVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Consistent with `Eq`: trailing zero segments do not participate.
        self.segments[..self.significant_len()].hash(state);
    }
}

impl fmt::Display for ApiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.segments.iter().map(u64::to_string).collect();
        write!(f, "{}", parts.join("."))
    }
}

impl FromStr for ApiVersion {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ApiVersion {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// YAML reads an unquoted `7.0` as a float, so numbers are accepted too.
#[derive(Deserialize)]
#[serde(untagged)]
enum VersionLiteral {
    Text(String),
    Int(u64),
    Float(f64),
}

impl<'de> Deserialize<'de> for ApiVersion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = match VersionLiteral::deserialize(deserializer)? {
            VersionLiteral::Text(s) => s,
            VersionLiteral::Int(i) => i.to_string(),
            VersionLiteral::Float(f) => f.to_string(),
        };
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl From<ApiVersion> for String {
    fn from(v: ApiVersion) -> Self {
        v.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn v(raw: &str) -> ApiVersion {
        raw.parse().unwrap()
    }

    #[test]
    fn parses_leading_v_and_build_segment() {
        assert_eq!(v("v6.2.3").segments(), &[6, 2, 3]);
        assert_eq!(v("6.4.0.1803").segments(), &[6, 4, 0, 1803]);
    }

    #[test]
    fn compares_numerically_not_lexically() {
        assert!(v("6.2.10") > v("6.2.9"));
        assert!(v("7.0") > v("6.4.14"));
        assert!(v("6.2.3") < v("6.2.4"));
    }

    #[test]
    fn missing_segments_are_zero() {
        assert_eq!(v("6.2"), v("6.2.0.0"));
        assert!(v("6.2") < v("6.2.0.1"));
    }

    #[test]
    fn equal_versions_hash_equal() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(v("6.2"));
        assert!(set.contains(&v("6.2.0")));
    }

    #[test]
    fn rejects_garbage() {
        assert!(ApiVersion::parse("").is_err());
        assert!(ApiVersion::parse("v").is_err());
        assert!(ApiVersion::parse("6.x.1").is_err());
        assert!(ApiVersion::parse("6..1").is_err());
    }

    #[test]
    fn serde_round_trips_as_string() {
        let parsed: ApiVersion = serde_json::from_str("\"v7.0.1\"").unwrap();
        assert_eq!(parsed, v("7.0.1"));
        assert_eq!(serde_json::to_string(&parsed).unwrap(), "\"7.0.1\"");
    }

    #[test]
    fn deserializes_bare_numbers() {
        let parsed: ApiVersion = serde_json::from_str("7.2").unwrap();
        assert_eq!(parsed, v("7.2"));
        let parsed: ApiVersion = serde_json::from_str("7").unwrap();
        assert_eq!(parsed, v("7.0"));
    }
}
