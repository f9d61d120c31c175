use std::collections::VecDeque;
use std::mem;

use tracing::trace;

use crate::match_runner::MatchSettings;

/// Hands out pending matches while keeping at most `max_running` of them in flight.
pub struct MatchQueue {
    pending: VecDeque<MatchSettings>,
    running_matches: usize,
    max_running: usize,
}

impl MatchQueue {
    pub fn new(matches: Vec<MatchSettings>, max_running: usize) -> Self {
        MatchQueue {
            pending: matches.into(),
            running_matches: 0,
            max_running: max_running.max(1),
        }
    }

    /// Matches to launch now.
    pub fn advance(&mut self) -> Vec<MatchSettings> {
        let free = self.max_running.saturating_sub(self.running_matches);
        let take = free.min(self.pending.len());
        let matches_to_run: Vec<_> = self.pending.drain(..take).collect();
        self.running_matches += matches_to_run.len();
        trace!(
            launched = matches_to_run.len(),
            running = self.running_matches,
            pending = self.pending.len()
        );
        matches_to_run
    }

    /// Frees the slot of a finished match and returns the matches to launch next.
    pub fn on_result(&mut self) -> Vec<MatchSettings> {
        self.running_matches = self.running_matches.saturating_sub(1);
        self.advance()
    }

    /// Drops every match not yet launched and returns them.
    pub fn halt(&mut self) -> Vec<MatchSettings> {
        mem::take(&mut self.pending).into()
    }

    /// All launched matches finished and nothing is pending.
    pub fn is_finished(&self) -> bool {
        self.running_matches == 0 && self.pending.is_empty()
    }
}
