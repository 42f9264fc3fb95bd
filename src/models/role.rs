// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Caller roles.
//!
//! Coach and Admin are interchangeable for conversation purposes; both are
//! "staff". Use [`Role::is_staff`] rather than matching on the variants.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The staff half of the role space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaffRole {
    Coach,
    Admin,
}

/// Role held by an authenticated caller or a message author.
///
/// Serialized as a flat lowercase string: `student`, `coach` or `admin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    Student,
    Staff(StaffRole),
}

impl Role {
    pub const COACH: Role = Role::Staff(StaffRole::Coach);
    pub const ADMIN: Role = Role::Staff(StaffRole::Admin);

    pub fn is_staff(self) -> bool {
        matches!(self, Role::Staff(_))
    }

    pub fn is_student(self) -> bool {
        !self.is_staff()
    }

    /// Whether `self` and `other` sit on opposite sides of a conversation.
    pub fn is_opposite(self, other: Role) -> bool {
        self.is_staff() != other.is_staff()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Staff(StaffRole::Coach) => "coach",
            Role::Staff(StaffRole::Admin) => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized role string.
#[derive(Debug, thiserror::Error)]
#[error("unknown role: {0}")]
pub struct UnknownRole(pub String);

impl std::str::FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "student" => Ok(Role::Student),
            "coach" => Ok(Role::COACH),
            "admin" => Ok(Role::ADMIN),
            _ => Err(UnknownRole(s.to_string())),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = UnknownRole;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Role> for String {
    fn from(role: Role) -> Self {
        role.as_str().to_string()
    }
}
