//! Persistence collaborator.
//!
//! The orchestrator never talks to a database directly: it reads submissions and writes results
//! through [`GameStore`]. [`InMemoryStore`] is a complete implementation backed by maps, used by
//! tests and by callers that persist the [`RunSummary`](crate::orchestrator::RunSummary)
//! themselves.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::agent::TeamId;
use crate::conversation::Transcript;

/// Separator between the role prompts of a submission.
pub const PROMPT_DELIMITER: &str = "#_;:)";

/// Reservation values of a group, as stored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupValues {
    /// Value of the role that wants a low deal
    pub minimizer_value: f64,
    /// Value of the role that wants a high deal
    pub maximizer_value: f64,
}

/// Key of a persisted match: `team_a` always played role 1.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MatchKey {
    /// Game identifier
    pub game_id: String,
    /// Round number, starting at 1
    pub round: u32,
    /// Team in role 1 (or first seat of a symmetric game)
    pub team_a: TeamId,
    /// Team in role 2
    pub team_b: TeamId,
}

/// Scores of a finished match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoundResult {
    /// Score of `team_a`
    pub score_a: f64,
    /// Score of `team_b`
    pub score_b: f64,
    /// Name of the role played by `team_a`
    pub role_a: String,
    /// Name of the role played by `team_b`
    pub role_b: String,
}

/// Transcript and extracted outcome of a finished match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptRecord {
    /// Everything that was said
    pub transcript: Transcript,
    /// Analyzer summary, or the private decisions of a cheap-talk game
    pub summary: String,
    /// Agreed value, if any
    pub deal_value: Option<f64>,
}

/// A pairing with at least one match still missing a valid result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMatchup {
    /// Round number
    pub round: u32,
    /// First team of the pairing
    pub team_a: TeamId,
    /// Second team of the pairing
    pub team_b: TeamId,
    /// The match with `team_a` in role 1 failed
    pub role_a_failed: bool,
    /// The match with `team_b` in role 1 failed
    pub role_b_failed: bool,
}

/// Everything the orchestrator needs from persistence.
///
/// Implementations are shared between match threads and must be thread-safe. Writes keyed by
/// [`MatchKey`] are upserts: writing the same key twice keeps only the last value.
pub trait GameStore: Send + Sync {
    /// Raw prompt submission of a group, role prompts joined by [`PROMPT_DELIMITER`].
    fn get_student_prompt(&self, game_id: &str, team: &TeamId) -> anyhow::Result<Option<String>>;

    /// Reservation values of a group.
    fn get_group_values(&self, game_id: &str, team: &TeamId)
        -> anyhow::Result<Option<GroupValues>>;

    /// Stores the scores of a match and clears any failure recorded for it.
    fn persist_round_result(&self, key: &MatchKey, result: &RoundResult) -> anyhow::Result<()>;

    /// Stores the transcript of a match.
    fn persist_transcript(&self, key: &MatchKey, record: &TranscriptRecord) -> anyhow::Result<()>;

    /// Marks a match as failed so a later pass can retry it.
    fn record_failed_match(&self, key: &MatchKey) -> anyhow::Result<()>;

    /// Pairings with failed matches, for the retry pass.
    fn get_error_matchups(&self, game_id: &str) -> anyhow::Result<Vec<ErrorMatchup>>;
}

#[derive(Default)]
struct Tables {
    prompts: HashMap<(String, TeamId), String>,
    values: HashMap<(String, TeamId), GroupValues>,
    results: BTreeMap<MatchKey, RoundResult>,
    transcripts: BTreeMap<MatchKey, TranscriptRecord>,
    failures: BTreeSet<MatchKey>,
}

/// [`GameStore`] kept in memory.
#[derive(Default)]
pub struct InMemoryStore {
    tables: Mutex<Tables>,
}

impl InMemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Registers the submission of a group.
    pub fn insert_prompt(&self, game_id: &str, team: &TeamId, prompt: impl Into<String>) {
        self.tables()
            .prompts
            .insert((game_id.to_owned(), team.clone()), prompt.into());
    }

    /// Withdraws the submission of a group.
    pub fn remove_prompt(&self, game_id: &str, team: &TeamId) {
        self.tables()
            .prompts
            .remove(&(game_id.to_owned(), team.clone()));
    }

    /// Registers the reservation values of a group.
    pub fn insert_values(&self, game_id: &str, team: &TeamId, values: GroupValues) {
        self.tables()
            .values
            .insert((game_id.to_owned(), team.clone()), values);
    }

    /// All stored results, ordered by key.
    pub fn round_results(&self) -> Vec<(MatchKey, RoundResult)> {
        self.tables()
            .results
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Stored transcript of one match.
    pub fn transcript(&self, key: &MatchKey) -> Option<TranscriptRecord> {
        self.tables().transcripts.get(key).cloned()
    }

    /// Matches currently marked as failed.
    pub fn failed_matches(&self) -> Vec<MatchKey> {
        self.tables().failures.iter().cloned().collect()
    }
}

impl GameStore for InMemoryStore {
    fn get_student_prompt(&self, game_id: &str, team: &TeamId) -> anyhow::Result<Option<String>> {
        Ok(self
            .tables()
            .prompts
            .get(&(game_id.to_owned(), team.clone()))
            .cloned())
    }

    fn get_group_values(
        &self,
        game_id: &str,
        team: &TeamId,
    ) -> anyhow::Result<Option<GroupValues>> {
        Ok(self
            .tables()
            .values
            .get(&(game_id.to_owned(), team.clone()))
            .copied())
    }

    fn persist_round_result(&self, key: &MatchKey, result: &RoundResult) -> anyhow::Result<()> {
        let mut tables = self.tables();
        tables.failures.remove(key);
        tables.results.insert(key.clone(), result.clone());
        Ok(())
    }

    fn persist_transcript(&self, key: &MatchKey, record: &TranscriptRecord) -> anyhow::Result<()> {
        self.tables().transcripts.insert(key.clone(), record.clone());
        Ok(())
    }

    fn record_failed_match(&self, key: &MatchKey) -> anyhow::Result<()> {
        let mut tables = self.tables();
        tables.results.remove(key);
        tables.failures.insert(key.clone());
        Ok(())
    }

    fn get_error_matchups(&self, game_id: &str) -> anyhow::Result<Vec<ErrorMatchup>> {
        // both directions of a pairing collapse into one entry
        let mut matchups: BTreeMap<(u32, TeamId, TeamId), ErrorMatchup> = BTreeMap::new();
        for key in self.tables().failures.iter().filter(|k| k.game_id == game_id) {
            let (first, second, a_failed) = if key.team_a <= key.team_b {
                (key.team_a.clone(), key.team_b.clone(), true)
            } else {
                (key.team_b.clone(), key.team_a.clone(), false)
            };
            let entry = matchups
                .entry((key.round, first.clone(), second.clone()))
                .or_insert(ErrorMatchup {
                    round: key.round,
                    team_a: first,
                    team_b: second,
                    role_a_failed: false,
                    role_b_failed: false,
                });
            if a_failed {
                entry.role_a_failed = true;
            } else {
                entry.role_b_failed = true;
            }
        }
        Ok(matchups.into_values().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(round: u32, a: u32, b: u32) -> MatchKey {
        MatchKey {
            game_id: "g".into(),
            round,
            team_a: TeamId::new("A", a),
            team_b: TeamId::new("A", b),
        }
    }

    #[test]
    fn result_write_is_an_upsert() {
        let store = InMemoryStore::new();
        let result = |score_a| RoundResult {
            score_a,
            score_b: 1.0 - score_a,
            role_a: "Buyer".into(),
            role_b: "Seller".into(),
        };
        store.persist_round_result(&key(1, 1, 2), &result(0.2)).unwrap();
        store.persist_round_result(&key(1, 1, 2), &result(0.7)).unwrap();
        let results = store.round_results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].1.score_a, 0.7);
    }

    #[test]
    fn failures_group_by_pairing_and_clear_on_success() {
        let store = InMemoryStore::new();
        store.record_failed_match(&key(1, 1, 2)).unwrap();
        store.record_failed_match(&key(1, 2, 1)).unwrap();
        store.record_failed_match(&key(2, 3, 1)).unwrap();

        let errors = store.get_error_matchups("g").unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].team_a, TeamId::new("A", 1));
        assert!(errors[0].role_a_failed && errors[0].role_b_failed);
        assert_eq!(errors[1].team_a, TeamId::new("A", 1));
        assert!(!errors[1].role_a_failed && errors[1].role_b_failed);

        store
            .persist_round_result(
                &key(1, 1, 2),
                &RoundResult {
                    score_a: 0.5,
                    score_b: 0.5,
                    role_a: "Buyer".into(),
                    role_b: "Seller".into(),
                },
            )
            .unwrap();
        let errors = store.get_error_matchups("g").unwrap();
        assert!(!errors[0].role_a_failed && errors[0].role_b_failed);
        assert!(store.get_error_matchups("other").unwrap().is_empty());
    }
}
