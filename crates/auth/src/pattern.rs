//! Wildcard permission patterns, compiled once at load time.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::PermissionId;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PatternError {
    #[error("permission pattern is empty")]
    Empty,

    #[error("empty segment in '{0}'")]
    EmptySegment(String),

    #[error("'*' must be a whole segment in '{0}'")]
    PartialWildcard(String),

    #[error("permission ids cannot contain '*': '{0}'")]
    WildcardInPermission(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(Box<str>),
    /// Exactly one segment.
    AnyOne,
}

/// A compiled pattern such as `gis.*.use` or `gis.*`.
///
/// A `*` in a non-final position matches exactly one segment. A final `*`
/// matches one or more remaining segments, so `gis.*` matches
/// `gis.distance.use` but not `gis`, and `*` alone matches every id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionPattern {
    raw: String,
    prefix: Vec<Segment>,
    trailing_wildcard: bool,
}

impl PermissionPattern {
    pub fn compile(raw: &str) -> Result<Self, PatternError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }

        let parts: Vec<&str> = raw.split('.').collect();
        let mut prefix = Vec::with_capacity(parts.len());
        for part in &parts {
            match *part {
                "" => return Err(PatternError::EmptySegment(raw.to_string())),
                "*" => prefix.push(Segment::AnyOne),
                p if p.contains('*') => return Err(PatternError::PartialWildcard(raw.to_string())),
                p => prefix.push(Segment::Literal(Box::from(p))),
            }
        }

        let trailing_wildcard = matches!(prefix.last(), Some(Segment::AnyOne));
        if trailing_wildcard {
            prefix.pop();
        }

        Ok(Self {
            raw: raw.to_string(),
            prefix,
            trailing_wildcard,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, permission: &PermissionId) -> bool {
        let segments = permission.segments();

        let length_ok = if self.trailing_wildcard {
            segments.len() > self.prefix.len()
        } else {
            segments.len() == self.prefix.len()
        };

        length_ok
            && self
                .prefix
                .iter()
                .zip(segments)
                .all(|(pattern, actual)| match pattern {
                    Segment::AnyOne => true,
                    Segment::Literal(lit) => lit == actual,
                })
    }

    /// Number of literal segments; higher is more specific.
    pub fn specificity(&self) -> usize {
        self.prefix
            .iter()
            .filter(|s| matches!(s, Segment::Literal(_)))
            .count()
    }
}

impl TryFrom<String> for PermissionPattern {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::compile(&value)
    }
}

impl From<PermissionPattern> for String {
    fn from(value: PermissionPattern) -> Self {
        value.raw
    }
}

impl core::fmt::Display for PermissionPattern {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.raw)
    }
}
