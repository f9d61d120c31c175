//! Per-team aggregation of match results, the input of a leaderboard.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::agent::TeamId;
use crate::orchestrator::MatchRecord;

/// Accumulated results of one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamStanding {
    /// The team
    pub team: TeamId,
    /// Matches with a valid result
    pub matches: u32,
    /// Sum of scores
    pub total_score: f64,
    /// Matches ending in an agreement (or two parsed decisions)
    pub agreements: u32,
}

impl TeamStanding {
    /// Mean score per match.
    pub fn average_score(&self) -> f64 {
        if self.matches == 0 {
            0.0
        } else {
            self.total_score / self.matches as f64
        }
    }
}

impl std::fmt::Display for TeamStanding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: average {:.3} over {} matches, {} agreements",
            self.team,
            self.average_score(),
            self.matches,
            self.agreements
        )
    }
}

/// Aggregates `records` per team, best average first. Failed matches are ignored.
///
/// Ties are broken by total score, then by team id.
pub fn compute_standings(records: &[MatchRecord]) -> Vec<TeamStanding> {
    let mut by_team: HashMap<TeamId, TeamStanding> = HashMap::new();
    for record in records.iter().filter(|r| r.succeeded) {
        let agreement = record.outcome.as_ref().is_some_and(|o| o.is_agreement());
        for (team, score) in [
            (&record.key.team_a, record.score_a),
            (&record.key.team_b, record.score_b),
        ] {
            let entry = by_team.entry(team.clone()).or_insert_with(|| TeamStanding {
                team: team.clone(),
                matches: 0,
                total_score: 0.0,
                agreements: 0,
            });
            entry.matches += 1;
            entry.total_score += score;
            if agreement {
                entry.agreements += 1;
            }
        }
    }

    let mut standings: Vec<_> = by_team.into_values().collect();
    standings.sort_by(|a, b| {
        b.average_score()
            .partial_cmp(&a.average_score())
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.total_score
                    .partial_cmp(&a.total_score)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.team.cmp(&b.team))
    });
    standings
}
