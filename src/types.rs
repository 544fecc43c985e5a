/// Shared types used across the codebase

use serde::{Deserialize, Serialize};

/// Account roles carried in user blocks and token claims
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superadmin,
    Schooladmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Schooladmin => "schooladmin",
        }
    }

    /// Parse a role name as sent by clients; unknown names yield None
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "superadmin" => Some(Role::Superadmin),
            "schooladmin" => Some(Role::Schooladmin),
            _ => None,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
