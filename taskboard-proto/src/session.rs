//! Session identity consumed from the session provider.
//!
//! The session decides which slice of the task collection a user can see.
//! An unrecognized role string parses to `None`, which every consumer must
//! treat as "no access".

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::task::ParseEnumError;

/// User role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// `admin`: sees every task.
    #[serde(rename = "admin")]
    Admin,
    /// `jefe`: sees the tasks of their department.
    #[serde(rename = "jefe")]
    Lead,
    /// `operativo`: sees the tasks assigned to them.
    #[serde(rename = "operativo")]
    Worker,
}

impl Role {
    /// All roles.
    pub const ALL: [Self; 3] = [Self::Admin, Self::Lead, Self::Worker];

    /// Wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Lead => "jefe",
            Self::Worker => "operativo",
        }
    }

    /// Parses a role, returning `None` for anything unrecognized.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        raw.parse().ok()
    }

    /// Whether the role may create tasks.
    #[must_use]
    pub const fn can_create(self) -> bool {
        matches!(self, Self::Admin | Self::Lead)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| ParseEnumError {
                kind: "role",
                value: s.to_string(),
            })
    }
}

/// The authenticated user, as supplied by the session provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Session {
    /// Stable user identifier, recorded as `createdBy`.
    pub user_id: String,
    /// Login email; workers are matched on it.
    pub email: String,
    /// Display name, recorded as `createdByName`.
    pub display_name: String,
    /// Role, `None` when absent or unrecognized.
    pub role: Option<Role>,
    /// Department; leads are matched on it.
    pub department: Option<String>,
}

impl Session {
    /// Builds a session from raw provider values, parsing the role leniently.
    pub fn new(
        user_id: impl Into<String>,
        email: impl Into<String>,
        role: &str,
        department: Option<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            email: email.into(),
            display_name: String::new(),
            role: Role::parse(role),
            department,
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }
}
