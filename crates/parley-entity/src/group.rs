//! Chat groups and membership.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use parley_core::AppError;
use parley_core::types::{GroupId, UserId};

/// Whether a group is a one-to-one conversation or a multi-member room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    /// Exactly two members; the basis for presence counterparts.
    Direct,
    /// Any number of members.
    Group,
}

impl GroupKind {
    /// Return the kind as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

impl FromStr for GroupKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::Direct),
            "group" => Ok(Self::Group),
            _ => Err(AppError::validation(format!("Invalid group kind: '{s}'"))),
        }
    }
}

/// A chat group. Its fan-out room shares the group's ID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group ID.
    pub id: GroupId,
    /// Display name.
    pub name: String,
    /// Direct or multi-member.
    pub kind: GroupKind,
    /// Inactive groups accept no new messages.
    pub is_active: bool,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Role a member holds inside a group.
///
/// Roles are ordered by privilege level: Admin > Moderator > Member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    /// Full control over the group.
    Admin,
    /// May moderate other members' messages.
    Moderator,
    /// Regular participant.
    Member,
}

impl MemberRole {
    /// Return the privilege level (higher = more privileged).
    pub fn privilege_level(&self) -> u8 {
        match self {
            Self::Admin => 3,
            Self::Moderator => 2,
            Self::Member => 1,
        }
    }

    /// Whether this role may delete other members' messages.
    pub fn can_moderate(&self) -> bool {
        self.privilege_level() >= Self::Moderator.privilege_level()
    }

    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for MemberRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberRole {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "admin" => Ok(Self::Admin),
            "moderator" => Ok(Self::Moderator),
            "member" => Ok(Self::Member),
            _ => Err(AppError::validation(format!(
                "Invalid member role: '{s}'. Expected one of: admin, moderator, member"
            ))),
        }
    }
}

/// A user's membership in a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMembership {
    /// Group ID.
    pub group_id: GroupId,
    /// Member user ID.
    pub user_id: UserId,
    /// Role inside the group.
    pub role: MemberRole,
    /// Inactive memberships (left, removed, banned) grant nothing.
    pub is_active: bool,
    /// When the user joined.
    pub joined_at: DateTime<Utc>,
}
