//! Builds teams from persisted submissions before any match is played.

use std::collections::HashSet;
use std::io::Write;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::agent::{Agent, ReservationValues, Role, Team, TeamId};
use crate::error::TeamError;
use crate::game::GameKind;
use crate::storage::{GameStore, GroupValues, PROMPT_DELIMITER};

const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const RESET: &str = "\x1b[0m";

/// Builds one [`Team`] per id from the persisted submissions.
///
/// Teams with a missing or malformed submission, or without reservation values when the game
/// needs them, are left out and returned alongside the reason. Duplicate ids are collected once.
#[instrument(skip(store, game))]
pub fn collect_teams(
    store: &dyn GameStore,
    game_id: &str,
    team_ids: &[TeamId],
    game: &GameKind,
    verbose: bool,
) -> (Vec<Arc<Team>>, Vec<(TeamId, TeamError)>) {
    let longest_name = team_ids
        .iter()
        .fold(0, |acu, id| acu.max(id.to_string().len()))
        + 3; // at least 3 dots

    if verbose {
        println!("Collecting teams...");
    }

    let mut seen = HashSet::new();
    let mut teams = vec![];
    let mut excluded = vec![];

    for id in team_ids {
        if !seen.insert(id.clone()) {
            warn!("duplicate team '{id}' ignored");
            continue;
        }

        if verbose {
            print!("Collecting {:·<longest_name$} ", id.to_string());
            let _ = std::io::stdout().flush(); // try to flush stdout
        }

        match build_team(store, game_id, id, game) {
            Ok(team) => {
                if verbose {
                    println!("{GREEN}Ok{RESET}");
                }
                teams.push(Arc::new(team));
            }
            Err(e) => {
                error!("team '{id}' excluded: {e}");
                if verbose {
                    println!("{RED}{e}{RESET}");
                }
                excluded.push((id.clone(), e));
            }
        }
    }

    info!(collected = teams.len(), excluded = excluded.len());
    (teams, excluded)
}

fn build_team(
    store: &dyn GameStore,
    game_id: &str,
    id: &TeamId,
    game: &GameKind,
) -> Result<Team, TeamError> {
    let submission = store
        .get_student_prompt(game_id, id)
        .map_err(|e| TeamError::Store(format!("{e:#}")))?
        .filter(|prompt| !prompt.trim().is_empty())
        .ok_or(TeamError::MissingSubmission)?;

    let prompts = split_prompts(&submission, game.roles_per_team())?;

    let reservation_values = if game.needs_values() {
        let values = store
            .get_group_values(game_id, id)
            .map_err(|e| TeamError::Store(format!("{e:#}")))?
            .ok_or(TeamError::MissingValues)?;
        role_values(game, values)
    } else {
        ReservationValues::default()
    };

    let agent = |role: Role, prompt: &str| {
        Agent::new(format!("{id}_{}", game.role_name(role)), prompt)
    };
    Ok(Team {
        id: id.clone(),
        reservation_values,
        role1_agent: agent(Role::Role1, prompts[0]),
        role2_agent: prompts.get(1).map(|prompt| agent(Role::Role2, prompt)),
    })
}

/// Splits a submission into its role prompts.
///
/// A single-role game accepts a submission without delimiter; a two-role game requires exactly
/// two non-empty parts.
pub fn split_prompts(submission: &str, expected: usize) -> Result<Vec<&str>, TeamError> {
    let parts: Vec<&str> = submission
        .split(PROMPT_DELIMITER)
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    match (expected, parts.len()) {
        (1, n) if n >= 1 => Ok(parts[..1].to_vec()),
        (e, n) if e == n => Ok(parts),
        (expected, found) => Err(TeamError::MalformedPrompt { expected, found }),
    }
}

fn role_values(game: &GameKind, values: GroupValues) -> ReservationValues {
    let minimizer = match game {
        GameKind::Negotiation(game) => game.minimizer,
        GameKind::PrisonersDilemma(_) => Role::Role1,
    };
    match minimizer {
        Role::Role1 => ReservationValues {
            role1: values.minimizer_value,
            role2: values.maximizer_value,
        },
        Role::Role2 => ReservationValues {
            role1: values.maximizer_value,
            role2: values.minimizer_value,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{DilemmaGame, NegotiationGame};
    use crate::storage::InMemoryStore;

    fn negotiation() -> GameKind {
        GameKind::Negotiation(NegotiationGame {
            role1_name: "Buyer".into(),
            role2_name: "Seller".into(),
            description: String::new(),
            minimizer: Role::Role1,
        })
    }

    #[test]
    fn split_requires_both_roles() {
        assert_eq!(split_prompts("buy#_;:)sell", 2).unwrap(), vec!["buy", "sell"]);
        assert_eq!(
            split_prompts("buy only", 2),
            Err(TeamError::MalformedPrompt {
                expected: 2,
                found: 1
            })
        );
        assert_eq!(split_prompts("just talk", 1).unwrap(), vec!["just talk"]);
    }

    #[test]
    fn incomplete_teams_are_excluded() {
        let store = InMemoryStore::new();
        let (ok, no_values, no_prompt, bad_prompt) = (
            TeamId::new("A", 1),
            TeamId::new("A", 2),
            TeamId::new("A", 3),
            TeamId::new("A", 4),
        );
        let values = GroupValues {
            minimizer_value: 100.0,
            maximizer_value: 60.0,
        };
        store.insert_prompt("g", &ok, "buy#_;:)sell");
        store.insert_values("g", &ok, values);
        store.insert_prompt("g", &no_values, "buy#_;:)sell");
        store.insert_values("g", &no_prompt, values);
        store.insert_prompt("g", &bad_prompt, "buy");
        store.insert_values("g", &bad_prompt, values);

        let ids = [ok.clone(), no_values, no_prompt, bad_prompt, ok.clone()];
        let (teams, excluded) = collect_teams(&store, "g", &ids, &negotiation(), false);

        assert_eq!(teams.len(), 1);
        let team = &teams[0];
        assert_eq!(team.reservation_values.role1, 100.0);
        assert_eq!(team.reservation_values.role2, 60.0);
        assert_eq!(team.role1_agent.name, "ClassA_Group1_Buyer");
        assert_eq!(team.role2_agent.as_ref().unwrap().system_message, "sell");

        let reasons: Vec<_> = excluded.into_iter().map(|(_, e)| e).collect();
        assert_eq!(
            reasons,
            vec![
                TeamError::MissingValues,
                TeamError::MissingSubmission,
                TeamError::MalformedPrompt {
                    expected: 2,
                    found: 1
                },
            ]
        );
    }

    #[test]
    fn dilemma_teams_need_no_values() {
        let store = InMemoryStore::new();
        let id = TeamId::new("B", 1);
        store.insert_prompt("g", &id, "always cooperate");
        let game = GameKind::PrisonersDilemma(DilemmaGame::default());
        let (teams, excluded) = collect_teams(&store, "g", &[id], &game, false);
        assert!(excluded.is_empty());
        assert!(teams[0].role2_agent.is_none());
    }
}
