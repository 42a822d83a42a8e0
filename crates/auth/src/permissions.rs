use serde::{Deserialize, Serialize};

use crate::PatternError;

/// A concrete permission being checked (e.g. `gis.distance.use`).
///
/// Split into segments once at parse time; patterns compare segment slices.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionId {
    raw: String,
    segments: Vec<Box<str>>,
}

impl PermissionId {
    /// Parse a dot-separated id. Empty segments and `*` are rejected.
    pub fn parse(raw: &str) -> Result<Self, PatternError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PatternError::Empty);
        }

        let mut segments = Vec::new();
        for segment in raw.split('.') {
            if segment.is_empty() {
                return Err(PatternError::EmptySegment(raw.to_string()));
            }
            if segment.contains('*') {
                return Err(PatternError::WildcardInPermission(raw.to_string()));
            }
            segments.push(Box::from(segment));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn segments(&self) -> &[Box<str>] {
        &self.segments
    }
}

impl TryFrom<String> for PermissionId {
    type Error = PatternError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PermissionId> for String {
    fn from(value: PermissionId) -> Self {
        value.raw
    }
}

impl core::fmt::Display for PermissionId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.raw)
    }
}
