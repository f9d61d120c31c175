//! Counters accumulated over one orchestration call.
//!
//! Each match thread fills its own copy; the orchestrator thread merges them as results arrive,
//! so no counter is ever shared between threads.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Seconds spent in each phase, summed over matches.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TimingTotals {
    /// Agent-to-agent conversations
    pub conversation_secs: f64,
    /// Analyzer summaries and private decisions
    pub extraction_secs: f64,
    /// Store writes
    pub persistence_secs: f64,
    /// Attempts that ended in an error
    pub failed_attempt_secs: f64,
    /// Wall-clock time of the whole call
    pub total_secs: f64,
}

impl TimingTotals {
    /// Adds every phase of `other` except the wall-clock total.
    pub fn merge(&mut self, other: &TimingTotals) {
        self.conversation_secs += other.conversation_secs;
        self.extraction_secs += other.extraction_secs;
        self.persistence_secs += other.persistence_secs;
        self.failed_attempt_secs += other.failed_attempt_secs;
    }

    pub(crate) fn add(slot: &mut f64, elapsed: Duration) {
        *slot += elapsed.as_secs_f64();
    }
}

/// Attempt and outcome counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunDiagnostics {
    /// Attempts started
    pub attempts_total: u32,
    /// Attempts that ended in an error
    pub attempts_failed: u32,
    /// Matches that produced a result
    pub successful_chats: u32,
    /// Matches given up on
    pub failed_chats: u32,
    /// Messages exchanged in successful matches
    pub total_turns: u32,
    /// Negotiations where a value was extracted
    pub agreements: u32,
    /// Successful matches without agreement or with an unparsed decision
    pub no_agreements: u32,
}

impl RunDiagnostics {
    /// Adds every counter of `other`.
    pub fn merge(&mut self, other: &RunDiagnostics) {
        self.attempts_total += other.attempts_total;
        self.attempts_failed += other.attempts_failed;
        self.successful_chats += other.successful_chats;
        self.failed_chats += other.failed_chats;
        self.total_turns += other.total_turns;
        self.agreements += other.agreements;
        self.no_agreements += other.no_agreements;
    }

    /// Mean number of messages per successful match.
    pub fn average_turns(&self) -> f64 {
        if self.successful_chats == 0 {
            0.0
        } else {
            self.total_turns as f64 / self.successful_chats as f64
        }
    }
}
