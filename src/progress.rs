//! Progress reporting.
//!
//! Observers are purely informative: nothing they do changes how matches are run. They are
//! always called from the orchestrator thread, so events of one match arrive in order while
//! events of different matches may interleave.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Where a match stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// An attempt started
    Running,
    /// An attempt failed and another one follows
    Retrying,
    /// The match produced a result
    Completed,
    /// The match was given up on
    Failed,
}

impl Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Running => "running",
            Phase::Retrying => "retrying",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One progress notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Round number, starting at 1
    pub round: u32,
    /// Name of the team in role 1
    pub team_a: String,
    /// Name of the team in role 2
    pub team_b: String,
    /// Role name played by `team_a`
    pub role_a: String,
    /// Role name played by `team_b`
    pub role_b: String,
    /// Matches finished so far, this one included once completed or failed
    pub completed: usize,
    /// Matches in this call
    pub total: usize,
    /// What happened
    pub phase: Phase,
    /// Attempt number, starting at 1
    pub attempt: Option<u32>,
    /// Seconds spent in the attempt (or the whole match once finished)
    pub elapsed_secs: Option<f64>,
}

/// Receives [`ProgressEvent`]s.
pub trait ProgressObserver {
    /// Called once per event.
    fn on_progress(&mut self, event: &ProgressEvent);
}

impl<F: FnMut(&ProgressEvent)> ProgressObserver for F {
    fn on_progress(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// Ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _event: &ProgressEvent) {}
}
