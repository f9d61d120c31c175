//! The games a tournament can run.

use serde::{Deserialize, Serialize};

use crate::agent::Role;
use crate::scoring::PayoffMatrix;

/// A bilateral negotiation over a single value, one team per role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NegotiationGame {
    /// Display name of role 1 (e.g. `"Buyer"`)
    pub role1_name: String,
    /// Display name of role 2 (e.g. `"Seller"`)
    pub role2_name: String,
    /// Shared context given to both agents
    pub description: String,
    /// The role that wants a low deal. Its reservation value is the ceiling.
    pub minimizer: Role,
}

impl NegotiationGame {
    /// Display name of `role`.
    pub fn role_name(&self, role: Role) -> &str {
        match role {
            Role::Role1 => &self.role1_name,
            Role::Role2 => &self.role2_name,
        }
    }
}

/// A prisoner's dilemma preceded by cheap talk. Both seats are equivalent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DilemmaGame {
    /// Display name of a player
    pub player_name: String,
    /// Shared context given to both agents
    pub description: String,
    /// Instructions shown before the private decision
    pub decision_prompt: String,
    /// Payoffs of every action pair
    pub payoffs: PayoffMatrix,
}

impl Default for DilemmaGame {
    fn default() -> Self {
        Self {
            player_name: "Prisoner".to_owned(),
            description: "You and another prisoner may talk before each of you privately \
                          decides to cooperate or defect."
                .to_owned(),
            decision_prompt: "The conversation is over. Decide now, privately, whether you \
                              cooperate or defect."
                .to_owned(),
            payoffs: PayoffMatrix::default(),
        }
    }
}

/// Rules of the tournament being run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GameKind {
    /// Two roles, played twice per pairing so each team holds each role once
    Negotiation(NegotiationGame),
    /// Symmetric cheap-talk game, played once per pairing
    PrisonersDilemma(DilemmaGame),
}

impl GameKind {
    /// Number of role prompts a submission must contain.
    pub fn roles_per_team(&self) -> usize {
        match self {
            GameKind::Negotiation(_) => 2,
            GameKind::PrisonersDilemma(_) => 1,
        }
    }

    /// Whether the reservation values of each team are needed.
    pub fn needs_values(&self) -> bool {
        matches!(self, GameKind::Negotiation(_))
    }

    /// `true` for games where seat order does not matter.
    pub fn is_symmetric(&self) -> bool {
        matches!(self, GameKind::PrisonersDilemma(_))
    }

    /// Display name of `role`.
    pub fn role_name(&self, role: Role) -> &str {
        match self {
            GameKind::Negotiation(game) => game.role_name(role),
            GameKind::PrisonersDilemma(game) => &game.player_name,
        }
    }
}
