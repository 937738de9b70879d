//! CI roles — the closed set used for port allocation and broadcast filtering.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The role a CI plays in a session.
///
/// Roles are a closed set: each role owns a fixed slot range in the port
/// allocator and can be used as a broadcast filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Writes code and produces artifacts.
    Builder,
    /// Sequences work across the other CIs.
    Coordinator,
    /// Elicits and refines requirements.
    Requirements,
    /// Reviews and analyzes artifacts.
    Analysis,
    /// Reserved slot range for future roles.
    Reserved,
}

impl Role {
    /// Offset of this role's slot range above the registry base port.
    #[must_use]
    pub fn port_offset(self) -> u16 {
        match self {
            Role::Builder => 0,
            Role::Coordinator => 10,
            Role::Requirements => 20,
            Role::Analysis => 30,
            Role::Reserved => 40,
        }
    }

    /// Stable lowercase name, as used in status reports and logs.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Builder => "builder",
            Role::Coordinator => "coordinator",
            Role::Requirements => "requirements",
            Role::Analysis => "analysis",
            Role::Reserved => "reserved",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "builder" => Ok(Role::Builder),
            "coordinator" => Ok(Role::Coordinator),
            "requirements" => Ok(Role::Requirements),
            "analysis" => Ok(Role::Analysis),
            "reserved" => Ok(Role::Reserved),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_are_ten_apart() {
        assert_eq!(Role::Builder.port_offset(), 0);
        assert_eq!(Role::Coordinator.port_offset(), 10);
        assert_eq!(Role::Requirements.port_offset(), 20);
        assert_eq!(Role::Analysis.port_offset(), 30);
        assert_eq!(Role::Reserved.port_offset(), 40);
    }

    #[test]
    fn round_trips_through_str() {
        for role in [
            Role::Builder,
            Role::Coordinator,
            Role::Requirements,
            Role::Analysis,
            Role::Reserved,
        ] {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
    }

    #[test]
    fn unknown_role_is_rejected() {
        assert!("manager".parse::<Role>().is_err());
    }
}
