use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of back-office roles. Stored as lowercase text in the
/// database; the admin role carries every editor capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Editor,
}

#[derive(Debug, Error)]
#[error("unknown role `{0}`")]
pub struct ParseRoleError(String);

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Editor => "editor",
        }
    }

    /// Whether a holder of this role satisfies `required`.
    pub fn satisfies(&self, required: Role) -> bool {
        match required {
            Role::Editor => true,
            Role::Admin => *self == Role::Admin,
        }
    }
}

impl std::str::FromStr for Role {
    type Err = ParseRoleError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "admin" => Ok(Role::Admin),
            "editor" => Ok(Role::Editor),
            other => Err(ParseRoleError(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval filter used by the user administration listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalFilter {
    Pending,
    Approved,
    #[default]
    All,
}
