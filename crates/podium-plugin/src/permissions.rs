//! Capability permission strings and per-plugin grants.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A single capability permission, rendered as `domain:action`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Permission {
    SubmissionsRead,
    SubmissionsWrite,
    SubmissionsManage,
    ReviewsRead,
    ReviewsWrite,
    UsersRead,
    EventsRead,
    StorageRead,
    StorageWrite,
    EmailSend,
    JobsRead,
    JobsWrite,
    DataRead,
    DataWrite,
}

/// The domain a permission belongs to. One capability object exists per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityDomain {
    Submissions,
    Reviews,
    Users,
    Events,
    Storage,
    Email,
    Jobs,
    Data,
}

impl Permission {
    pub const ALL: &'static [Permission] = &[
        Permission::SubmissionsRead,
        Permission::SubmissionsWrite,
        Permission::SubmissionsManage,
        Permission::ReviewsRead,
        Permission::ReviewsWrite,
        Permission::UsersRead,
        Permission::EventsRead,
        Permission::StorageRead,
        Permission::StorageWrite,
        Permission::EmailSend,
        Permission::JobsRead,
        Permission::JobsWrite,
        Permission::DataRead,
        Permission::DataWrite,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::SubmissionsRead => "submissions:read",
            Self::SubmissionsWrite => "submissions:write",
            Self::SubmissionsManage => "submissions:manage",
            Self::ReviewsRead => "reviews:read",
            Self::ReviewsWrite => "reviews:write",
            Self::UsersRead => "users:read",
            Self::EventsRead => "events:read",
            Self::StorageRead => "storage:read",
            Self::StorageWrite => "storage:write",
            Self::EmailSend => "email:send",
            Self::JobsRead => "jobs:read",
            Self::JobsWrite => "jobs:write",
            Self::DataRead => "data:read",
            Self::DataWrite => "data:write",
        }
    }

    pub fn domain(self) -> CapabilityDomain {
        match self {
            Self::SubmissionsRead | Self::SubmissionsWrite | Self::SubmissionsManage => {
                CapabilityDomain::Submissions
            }
            Self::ReviewsRead | Self::ReviewsWrite => CapabilityDomain::Reviews,
            Self::UsersRead => CapabilityDomain::Users,
            Self::EventsRead => CapabilityDomain::Events,
            Self::StorageRead | Self::StorageWrite => CapabilityDomain::Storage,
            Self::EmailSend => CapabilityDomain::Email,
            Self::JobsRead | Self::JobsWrite => CapabilityDomain::Jobs,
            Self::DataRead | Self::DataWrite => CapabilityDomain::Data,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Permission::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| format!("unknown permission '{s}'"))
    }
}

impl Serialize for Permission {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Permission {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

impl CapabilityDomain {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Submissions => "submissions",
            Self::Reviews => "reviews",
            Self::Users => "users",
            Self::Events => "events",
            Self::Storage => "storage",
            Self::Email => "email",
            Self::Jobs => "jobs",
            Self::Data => "data",
        }
    }
}

impl fmt::Display for CapabilityDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of permissions a plugin holds. Fixed at registration time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intersect what the manifest declares with what an administrator approved.
    ///
    /// Approved strings that do not name a known permission are dropped.
    pub fn grant(declared: &PermissionSet, approved: &[String]) -> Self {
        let mut granted = BTreeSet::new();
        for raw in approved {
            match raw.parse::<Permission>() {
                Ok(p) if declared.contains(p) => {
                    granted.insert(p);
                }
                Ok(p) => {
                    tracing::warn!(permission = %p, "approved permission not declared by manifest, ignoring");
                }
                Err(e) => {
                    tracing::warn!("ignoring approved permission: {e}");
                }
            }
        }
        Self(granted)
    }

    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    /// Whether any permission in `domain` is held.
    pub fn has_domain(&self, domain: CapabilityDomain) -> bool {
        self.0.iter().any(|p| p.domain() == domain)
    }

    pub fn insert(&mut self, permission: Permission) -> bool {
        self.0.insert(permission)
    }

    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Render as capability strings, e.g. for persisting approvals.
    pub fn to_strings(&self) -> Vec<String> {
        self.0.iter().map(|p| p.as_str().to_string()).collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = Permission>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
