//! Agents, roles and teams.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// An LLM-backed participant: a name and the system prompt that drives it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Agent {
    /// Speaker name shown in transcripts
    pub name: String,
    /// System prompt sent with every completion
    pub system_message: String,
}

impl Agent {
    /// Creates an agent.
    pub fn new(name: impl Into<String>, system_message: impl Into<String>) -> Agent {
        Agent {
            name: name.into(),
            system_message: system_message.into(),
        }
    }

    /// A copy of this agent whose system message carries `context` for the duration of one match.
    ///
    /// `self` is left untouched, so nothing leaks into the next match.
    pub fn with_context(&self, context: &str) -> Agent {
        if context.trim().is_empty() {
            return self.clone();
        }
        Agent {
            name: self.name.clone(),
            system_message: format!("{}\n\n{}", self.system_message, context.trim()),
        }
    }
}

/// The two seats of an asymmetric game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Role {
    /// First seat
    Role1,
    /// Second seat
    Role2,
}

impl Role {
    /// The opposite seat.
    pub fn other(self) -> Role {
        match self {
            Role::Role1 => Role::Role2,
            Role::Role2 => Role::Role1,
        }
    }

    /// 0 for role 1, 1 for role 2.
    pub fn index(self) -> usize {
        match self {
            Role::Role1 => 0,
            Role::Role2 => 1,
        }
    }
}

impl Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Role1 => write!(f, "role 1"),
            Role::Role2 => write!(f, "role 2"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace([' ', '_', '-'], "").as_str() {
            "role1" | "1" => Ok(Role::Role1),
            "role2" | "2" => Ok(Role::Role2),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// Identifies a tournament participant: a student group inside a class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TeamId {
    /// Class the group belongs to
    pub class: String,
    /// Group number inside the class
    pub group_id: u32,
}

impl TeamId {
    /// Creates an id.
    pub fn new(class: impl Into<String>, group_id: u32) -> TeamId {
        TeamId {
            class: class.into(),
            group_id,
        }
    }
}

impl Display for TeamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Class{}_Group{}", self.class, self.group_id)
    }
}

/// Private reservation values of a team, one per role.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReservationValues {
    /// Value when playing role 1
    pub role1: f64,
    /// Value when playing role 2
    pub role2: f64,
}

impl ReservationValues {
    /// Value for `role`.
    pub fn get(&self, role: Role) -> f64 {
        match role {
            Role::Role1 => self.role1,
            Role::Role2 => self.role2,
        }
    }
}

/// A participant with one agent per role.
///
/// Symmetric games only use `role1_agent`; `role2_agent` is then `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct Team {
    /// Identifier
    pub id: TeamId,
    /// Private values, one per role
    pub reservation_values: ReservationValues,
    /// Agent playing role 1, or the only agent of a symmetric game
    pub role1_agent: Agent,
    /// Agent playing role 2
    pub role2_agent: Option<Agent>,
}

impl Team {
    /// Display name, e.g. `ClassA_Group3`.
    pub fn name(&self) -> String {
        self.id.to_string()
    }

    /// Agent playing `role`, if any.
    pub fn agent(&self, role: Role) -> Option<&Agent> {
        match role {
            Role::Role1 => Some(&self.role1_agent),
            Role::Role2 => self.role2_agent.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_does_not_leak() {
        let agent = Agent::new("Buyer", "You buy things.");
        let scoped = agent.with_context("Your reservation value is 10.");
        assert_eq!(
            scoped.system_message,
            "You buy things.\n\nYour reservation value is 10."
        );
        assert_eq!(agent.system_message, "You buy things.");
        assert_eq!(agent.with_context("   "), agent);
    }

    #[test]
    fn role_parsing() {
        assert_eq!("role1".parse::<Role>(), Ok(Role::Role1));
        assert_eq!("Role 2".parse::<Role>(), Ok(Role::Role2));
        assert_eq!("role_2".parse::<Role>(), Ok(Role::Role2));
        assert!("seller".parse::<Role>().is_err());
        assert_eq!(Role::Role1.other(), Role::Role2);
    }

    #[test]
    fn team_name_encodes_class_and_group() {
        assert_eq!(TeamId::new("A", 3).to_string(), "ClassA_Group3");
    }
}
