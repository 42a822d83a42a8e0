use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use regiongate_core::SubjectId;

/// Group identifier used for inherited permission rules.
///
/// Groups are opaque strings at this layer; membership is asserted by the
/// upstream authentication layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupName(Cow<'static, str>);

impl GroupName {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for GroupName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An already-authenticated caller, as supplied by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub subject: SubjectId,
    /// Role flag: admins bypass region and permission checks.
    pub is_admin: bool,
    /// Group memberships, in the order their rules are evaluated.
    pub groups: Vec<GroupName>,
}

impl Identity {
    pub fn user(subject: SubjectId) -> Self {
        Self {
            subject,
            is_admin: false,
            groups: Vec::new(),
        }
    }

    pub fn admin(subject: SubjectId) -> Self {
        Self {
            is_admin: true,
            ..Self::user(subject)
        }
    }

    pub fn with_group(mut self, group: impl Into<Cow<'static, str>>) -> Self {
        self.groups.push(GroupName::new(group));
        self
    }

    /// Same identity with the admin flag raised (e.g. from an admin-bypass grant).
    pub fn elevated(&self) -> Self {
        Self {
            is_admin: true,
            ..self.clone()
        }
    }
}
