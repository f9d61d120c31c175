//! Runs a whole game: team collection, scheduling, bounded-parallel matches, persistence.
//!
//! Every match runs on its own thread and retries failed attempts up to
//! [`with_max_retries`](Configuration::with_max_retries) times. Threads report over a channel to
//! the calling thread, which is the only one to merge diagnostics, call the
//! [`ProgressObserver`] and write to the [`GameStore`]. At most
//! [`with_max_parallel_matches`](Configuration::with_max_parallel_matches) matches run at once.
//!
//! A run never aborts half-way: matches that keep failing are recorded as failed and listed in
//! the returned [`RunSummary`], which is [`RunStatus::Partial`] in that case. Those matches can be
//! played again with [`Orchestrator::run_error_matchups`].
//!
//! An authentication error stops launching new matches: the pending ones are recorded as failed
//! and [`RunSummary::authentication_error`] tells the operator to fix the credentials.

use std::any::Any;
use std::collections::HashMap;
use std::fmt::Display;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, trace, warn};

use crate::agent::{Role, Team, TeamId};
use crate::configuration::Configuration;
use crate::diagnostics::{RunDiagnostics, TimingTotals};
use crate::error::MatchError;
use crate::game::GameKind;
use crate::logger::init_logger;
use crate::match_queue::MatchQueue;
use crate::match_runner::{run_match, MatchResult, MatchSettings, Outcome};
use crate::progress::{Phase, ProgressEvent, ProgressObserver};
use crate::storage::{GameStore, MatchKey, RoundResult, TranscriptRecord};
use crate::team_collector::collect_teams;
use crate::tournament_scheduler::schedule;
use crate::transport::ChatTransport;

/// Whether every scheduled match produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every match has a persisted result
    Success,
    /// At least one match is missing a result
    Partial,
}

/// A match given up on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedMatch {
    /// Round number
    pub round: u32,
    /// Team in role 1
    pub team_a: TeamId,
    /// Team in role 2
    pub team_b: TeamId,
    /// Role name of `team_a`
    pub role_a: String,
    /// Role name of `team_b`
    pub role_b: String,
    /// Attempts made, 0 when the match was never launched
    pub attempts: u32,
    /// Last error
    pub reason: String,
}

impl Display for FailedMatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Round {}: {} ({}) vs {} ({}) failed after {} attempt(s): {}",
            self.round,
            self.team_a,
            self.role_a,
            self.team_b,
            self.role_b,
            self.attempts,
            self.reason
        )
    }
}

/// A team left out of the run before any match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExcludedTeam {
    /// The team
    pub team: TeamId,
    /// Why it was left out
    pub reason: String,
}

/// One finished match, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// Where the result is persisted
    pub key: MatchKey,
    /// Score of `key.team_a`
    pub score_a: f64,
    /// Score of `key.team_b`
    pub score_b: f64,
    /// Outcome, `None` for failed matches
    pub outcome: Option<Outcome>,
    /// Messages exchanged in the successful attempt
    pub turns_taken: usize,
    /// Attempts made
    pub attempts: u32,
    /// Whether the result was persisted
    pub succeeded: bool,
}

/// What an orchestration call returns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Success or partial
    pub status: RunStatus,
    /// Matches with a persisted result
    pub completed: usize,
    /// Matches launched and finished, successfully or not
    pub processed: usize,
    /// Matches scheduled
    pub total: usize,
    /// Matches missing a result
    pub errors: Vec<FailedMatch>,
    /// Human-readable report, one line per failed match
    pub message: String,
    /// Time spent per phase
    pub timing: TimingTotals,
    /// Attempt and outcome counters
    pub diagnostics: RunDiagnostics,
    /// Teams left out before scheduling
    pub excluded_teams: Vec<ExcludedTeam>,
    /// Set when the chat API rejected the credentials
    pub authentication_error: Option<String>,
    /// Every finished match
    pub results: Vec<MatchRecord>,
}

impl RunSummary {
    fn new(total: usize) -> RunSummary {
        RunSummary {
            status: RunStatus::Success,
            completed: 0,
            processed: 0,
            total,
            errors: vec![],
            message: String::new(),
            timing: TimingTotals::default(),
            diagnostics: RunDiagnostics::default(),
            excluded_teams: vec![],
            authentication_error: None,
            results: vec![],
        }
    }

    /// The summary as pretty-printed JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    fn finish(&mut self, start: Instant) {
        self.timing.total_secs = start.elapsed().as_secs_f64();
        self.status = if self.errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };

        let mut lines = vec![];
        if let Some(auth) = &self.authentication_error {
            lines.push(format!(
                "Authentication with the chat API failed ({auth}). Fix the API key before running the failed matches again."
            ));
        }
        if self.errors.is_empty() {
            lines.push(format!(
                "All {} matches completed successfully",
                self.completed
            ));
        } else {
            lines.push(format!(
                "{} of {} matches failed and need an error pass:",
                self.errors.len(),
                self.total
            ));
            lines.extend(self.errors.iter().map(FailedMatch::to_string));
        }
        self.message = lines.join("\n");
    }
}

/// Sent by match threads to the orchestrator thread.
enum WorkerMessage {
    Attempt {
        settings: MatchSettings,
        phase: Phase,
        attempt: u32,
        elapsed_secs: Option<f64>,
    },
    Finished {
        settings: MatchSettings,
        report: MatchReport,
    },
}

/// Everything a match thread learned about its match.
struct MatchReport {
    result: Result<MatchResult, MatchError>,
    attempts: u32,
    failed_attempts: u32,
    failed_secs: f64,
    elapsed_secs: f64,
}

/// Plays the matches of a game and persists their results.
pub struct Orchestrator {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn GameStore>,
    game: Arc<GameKind>,
    config: Configuration,
}

impl Orchestrator {
    /// Creates an orchestrator. Starts the file logger when the configuration asks for it.
    #[instrument(skip_all)]
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn GameStore>,
        game: GameKind,
        config: Configuration,
    ) -> Orchestrator {
        if config.log {
            if let Err(e) = init_logger() {
                eprintln!("could not start the logger: {e:#}");
            }
        }
        trace!(?config, ?game);

        Orchestrator {
            transport,
            store,
            game: Arc::new(game),
            config,
        }
    }

    /// The game being played.
    pub fn game(&self) -> &GameKind {
        &self.game
    }

    /// Plays every scheduled match between `team_ids`.
    ///
    /// Teams without a usable submission are excluded up front and listed in the summary.
    /// Negotiations play each pairing twice per round so both teams hold each role once.
    #[instrument(skip(self, progress))]
    pub fn run(
        &self,
        game_id: &str,
        team_ids: &[TeamId],
        progress: &mut dyn ProgressObserver,
    ) -> RunSummary {
        let start = Instant::now();
        let (teams, excluded) = collect_teams(
            self.store.as_ref(),
            game_id,
            team_ids,
            &self.game,
            self.config.verbose,
        );

        let matches = self.schedule_matches(&teams);
        info!(teams = teams.len(), matches = matches.len());

        let mut summary = self.execute(game_id, matches, progress);
        summary.excluded_teams = excluded
            .into_iter()
            .map(|(team, e)| ExcludedTeam {
                team,
                reason: e.to_string(),
            })
            .collect();
        summary.finish(start);
        info!(status = ?summary.status, completed = summary.completed, total = summary.total);
        summary
    }

    /// Plays again exactly the matches recorded as failed for `game_id`.
    ///
    /// # Errors
    /// Returns an error if the failed matches cannot be read from the store.
    #[instrument(skip(self, progress))]
    pub fn run_error_matchups(
        &self,
        game_id: &str,
        progress: &mut dyn ProgressObserver,
    ) -> anyhow::Result<RunSummary> {
        let start = Instant::now();
        let matchups = self.store.get_error_matchups(game_id)?;
        info!(matchups = matchups.len());

        let mut team_ids: Vec<TeamId> = matchups
            .iter()
            .flat_map(|m| [m.team_a.clone(), m.team_b.clone()])
            .collect();
        team_ids.sort();
        team_ids.dedup();
        let (teams, excluded) = collect_teams(
            self.store.as_ref(),
            game_id,
            &team_ids,
            &self.game,
            self.config.verbose,
        );
        let by_id: HashMap<&TeamId, &Arc<Team>> = teams.iter().map(|t| (&t.id, t)).collect();

        let mut matches = vec![];
        let mut unplayable = vec![];
        for m in &matchups {
            let (Some(a), Some(b)) = (by_id.get(&m.team_a), by_id.get(&m.team_b)) else {
                warn!(round = m.round, "cannot rerun {} vs {}", m.team_a, m.team_b);
                unplayable.push(m);
                continue;
            };
            if m.role_a_failed {
                matches.push(MatchSettings {
                    round: m.round,
                    team_a: Arc::clone(a),
                    team_b: Arc::clone(b),
                });
            }
            if m.role_b_failed {
                matches.push(MatchSettings {
                    round: m.round,
                    team_a: Arc::clone(b),
                    team_b: Arc::clone(a),
                });
            }
        }

        let mut summary = self.execute(game_id, matches, progress);
        for m in unplayable {
            let (role_a, role_b) = self.role_names();
            summary.total += 1;
            summary.errors.push(FailedMatch {
                round: m.round,
                team_a: m.team_a.clone(),
                team_b: m.team_b.clone(),
                role_a,
                role_b,
                attempts: 0,
                reason: "a team of this pairing could not be collected".to_owned(),
            });
        }
        summary.excluded_teams = excluded
            .into_iter()
            .map(|(team, e)| ExcludedTeam {
                team,
                reason: e.to_string(),
            })
            .collect();
        summary.finish(start);
        Ok(summary)
    }

    fn schedule_matches(&self, teams: &[Arc<Team>]) -> Vec<MatchSettings> {
        let rounds = schedule(teams, self.config.num_rounds());
        let mut matches = vec![];
        for (round, pairings) in (1..).zip(rounds) {
            for (a, b) in pairings {
                if !self.game.is_symmetric() {
                    // each team holds role 1 once per pairing
                    matches.push(MatchSettings {
                        round,
                        team_a: Arc::clone(&a),
                        team_b: Arc::clone(&b),
                    });
                    matches.push(MatchSettings {
                        round,
                        team_a: b,
                        team_b: a,
                    });
                } else {
                    matches.push(MatchSettings {
                        round,
                        team_a: a,
                        team_b: b,
                    });
                }
            }
        }
        matches
    }

    fn role_names(&self) -> (String, String) {
        (
            self.game.role_name(Role::Role1).to_owned(),
            self.game.role_name(Role::Role2).to_owned(),
        )
    }

    fn execute(
        &self,
        game_id: &str,
        matches: Vec<MatchSettings>,
        progress: &mut dyn ProgressObserver,
    ) -> RunSummary {
        let mut summary = RunSummary::new(matches.len());
        if matches.is_empty() {
            return summary;
        }
        let mut finished = 0;
        let mut running: Vec<MatchSettings> = vec![];

        if self.config.verbose {
            disable_line_wrap();
        }

        let mut queue = MatchQueue::new(matches, self.config.max_parallel_matches);
        let (tx, rx) = mpsc::channel();
        for m in queue.advance() {
            self.launch_match(m, tx.clone(), &mut running);
        }

        while !queue.is_finished() {
            // not finished <=> match running <=> message to receive
            let Ok(message) = rx.recv() else {
                error!("match threads disconnected");
                break;
            };
            match message {
                WorkerMessage::Attempt {
                    settings,
                    phase,
                    attempt,
                    elapsed_secs,
                } => {
                    if self.config.verbose && phase == Phase::Retrying {
                        print_retry(&settings, attempt);
                    }
                    let event = self
                        .event(&settings, finished, summary.total, phase)
                        .with_attempt(attempt, elapsed_secs);
                    progress.on_progress(&event);
                }
                WorkerMessage::Finished { settings, report } => {
                    running.retain(|m| m != &settings);
                    finished += 1;
                    self.on_finished(game_id, &settings, report, &mut summary, finished, progress);

                    if summary.authentication_error.is_some() {
                        for skipped in queue.halt() {
                            finished += 1;
                            self.on_skipped(game_id, &skipped, &mut summary, finished, progress);
                        }
                    }
                    for m in queue.on_result() {
                        self.launch_match(m, tx.clone(), &mut running);
                    }
                    if self.config.verbose {
                        print_running_matches(&running);
                    }
                }
            }
        }

        if self.config.verbose {
            enable_line_wrap();
        }
        summary
    }

    fn launch_match(
        &self,
        settings: MatchSettings,
        tx: Sender<WorkerMessage>,
        running: &mut Vec<MatchSettings>,
    ) {
        running.push(settings.clone());
        if self.config.verbose {
            print_running_matches(running);
        }

        let transport = Arc::clone(&self.transport);
        let game = Arc::clone(&self.game);
        let config = self.config.clone();
        std::thread::spawn(move || {
            let report = play_with_retries(&settings, &game, &config, transport.as_ref(), &tx);
            // the receiver only hangs up once every match has reported
            let _ = tx.send(WorkerMessage::Finished { settings, report });
        });
    }

    fn event(
        &self,
        settings: &MatchSettings,
        completed: usize,
        total: usize,
        phase: Phase,
    ) -> ProgressEvent {
        let (role_a, role_b) = self.role_names();
        ProgressEvent {
            round: settings.round,
            team_a: settings.team_a.name(),
            team_b: settings.team_b.name(),
            role_a,
            role_b,
            completed,
            total,
            phase,
            attempt: None,
            elapsed_secs: None,
        }
    }

    fn key(game_id: &str, settings: &MatchSettings) -> MatchKey {
        MatchKey {
            game_id: game_id.to_owned(),
            round: settings.round,
            team_a: settings.team_a.id.clone(),
            team_b: settings.team_b.id.clone(),
        }
    }

    fn on_finished(
        &self,
        game_id: &str,
        settings: &MatchSettings,
        report: MatchReport,
        summary: &mut RunSummary,
        finished: usize,
        progress: &mut dyn ProgressObserver,
    ) {
        summary.processed += 1;
        summary.diagnostics.attempts_total += report.attempts;
        summary.diagnostics.attempts_failed += report.failed_attempts;
        summary.timing.failed_attempt_secs += report.failed_secs;
        let key = Self::key(game_id, settings);

        let failure = match report.result {
            Ok(result) => {
                summary.timing.merge(&result.timing);
                let start = Instant::now();
                let persisted = self.persist(&key, &result);
                summary.timing.persistence_secs += start.elapsed().as_secs_f64();
                match persisted {
                    Ok(()) => {
                        self.on_success(key, settings, result, report.attempts, summary);
                        if self.config.verbose {
                            print_match_result(settings, &summary.results);
                        }
                        let event = self
                            .event(settings, finished, summary.total, Phase::Completed)
                            .with_attempt(report.attempts, Some(report.elapsed_secs));
                        progress.on_progress(&event);
                        return;
                    }
                    Err(e) => {
                        error!(%settings, "could not persist result: {e:#}");
                        format!("could not persist result: {e:#}")
                    }
                }
            }
            Err(e) => {
                error!(%settings, attempts = report.attempts, "match failed: {e}");
                if e.is_authentication() && summary.authentication_error.is_none() {
                    summary.authentication_error = Some(e.to_string());
                }
                e.to_string()
            }
        };

        self.on_failure(key, settings, report.attempts, failure, summary);
        let event = self
            .event(settings, finished, summary.total, Phase::Failed)
            .with_attempt(report.attempts, Some(report.elapsed_secs));
        progress.on_progress(&event);
    }

    fn on_skipped(
        &self,
        game_id: &str,
        settings: &MatchSettings,
        summary: &mut RunSummary,
        finished: usize,
        progress: &mut dyn ProgressObserver,
    ) {
        let key = Self::key(game_id, settings);
        self.on_failure(
            key,
            settings,
            0,
            "not played: authentication failed".to_owned(),
            summary,
        );
        let event = self.event(settings, finished, summary.total, Phase::Failed);
        progress.on_progress(&event);
    }

    fn persist(&self, key: &MatchKey, result: &MatchResult) -> anyhow::Result<()> {
        self.store.persist_transcript(
            key,
            &TranscriptRecord {
                transcript: result.transcript.clone(),
                summary: result.summary.clone(),
                deal_value: result.outcome.deal_value(),
            },
        )?;
        let (role_a, role_b) = self.role_names();
        self.store.persist_round_result(
            key,
            &RoundResult {
                score_a: result.score_a,
                score_b: result.score_b,
                role_a,
                role_b,
            },
        )
    }

    fn on_success(
        &self,
        key: MatchKey,
        settings: &MatchSettings,
        result: MatchResult,
        attempts: u32,
        summary: &mut RunSummary,
    ) {
        info!(%settings, score_a = result.score_a, score_b = result.score_b, "match completed");
        let diagnostics = &mut summary.diagnostics;
        diagnostics.successful_chats += 1;
        diagnostics.total_turns += result.turns_taken as u32;
        if result.outcome.is_agreement() {
            diagnostics.agreements += 1;
        } else {
            diagnostics.no_agreements += 1;
        }

        summary.completed += 1;
        summary.results.push(MatchRecord {
            key,
            score_a: result.score_a,
            score_b: result.score_b,
            outcome: Some(result.outcome),
            turns_taken: result.turns_taken,
            attempts,
            succeeded: true,
        });
    }

    fn on_failure(
        &self,
        key: MatchKey,
        settings: &MatchSettings,
        attempts: u32,
        reason: String,
        summary: &mut RunSummary,
    ) {
        if let Err(e) = self.store.record_failed_match(&key) {
            error!(%settings, "could not record failed match: {e:#}");
        }
        if self.config.verbose {
            print_failure(settings, &reason);
        }

        let (role_a, role_b) = self.role_names();
        summary.diagnostics.failed_chats += 1;
        summary.errors.push(FailedMatch {
            round: settings.round,
            team_a: settings.team_a.id.clone(),
            team_b: settings.team_b.id.clone(),
            role_a,
            role_b,
            attempts,
            reason,
        });
        summary.results.push(MatchRecord {
            key,
            score_a: 0.0,
            score_b: 0.0,
            outcome: None,
            turns_taken: 0,
            attempts,
            succeeded: false,
        });
    }
}

impl ProgressEvent {
    fn with_attempt(mut self, attempt: u32, elapsed_secs: Option<f64>) -> ProgressEvent {
        self.attempt = Some(attempt);
        self.elapsed_secs = elapsed_secs;
        self
    }
}

/// Plays `settings` until an attempt succeeds, a non-retryable error occurs or attempts run out.
fn play_with_retries(
    settings: &MatchSettings,
    game: &GameKind,
    config: &Configuration,
    transport: &dyn ChatTransport,
    tx: &Sender<WorkerMessage>,
) -> MatchReport {
    let match_start = Instant::now();
    let mut failed_attempts = 0;
    let mut failed_secs = 0.0;
    let mut attempt = 0;

    loop {
        attempt += 1;
        let _ = tx.send(WorkerMessage::Attempt {
            settings: settings.clone(),
            phase: Phase::Running,
            attempt,
            elapsed_secs: None,
        });

        let start = Instant::now();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            run_match(settings, game, config, transport)
        }))
        .unwrap_or_else(|payload| Err(MatchError::Panicked(panic_message(payload.as_ref()))));

        let err = match result {
            Ok(result) => {
                return MatchReport {
                    result: Ok(result),
                    attempts: attempt,
                    failed_attempts,
                    failed_secs,
                    elapsed_secs: match_start.elapsed().as_secs_f64(),
                }
            }
            Err(err) => err,
        };

        let elapsed = start.elapsed().as_secs_f64();
        failed_attempts += 1;
        failed_secs += elapsed;
        warn!(%settings, attempt, "attempt failed: {err}");

        if !err.is_retryable() || attempt >= config.max_retries {
            return MatchReport {
                result: Err(err),
                attempts: attempt,
                failed_attempts,
                failed_secs,
                elapsed_secs: match_start.elapsed().as_secs_f64(),
            };
        }

        let _ = tx.send(WorkerMessage::Attempt {
            settings: settings.clone(),
            phase: Phase::Retrying,
            attempt,
            elapsed_secs: Some(elapsed),
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

fn print_match_result(match_settings: &MatchSettings, results: &[MatchRecord]) {
    let Some(record) = results.last() else {
        return;
    };
    let outcome = match &record.outcome {
        Some(Outcome::Deal(Some(value))) => format!("deal at {value}"),
        Some(Outcome::Deal(None)) => "no deal".to_owned(),
        Some(Outcome::Decisions(a, b)) => format!("{a:?}/{b:?}"),
        None => String::new(),
    };

    // clear line, green match, scores, start of line
    println!(
        "\x1b[2K\x1b[32m{match_settings}: \x1b[39m{}-{} \x1b[2m{outcome}\x1b[0m\x1b[0G",
        record.score_a, record.score_b
    );
}

fn print_retry(match_settings: &MatchSettings, attempt: u32) {
    // clear line, yellow match, start of line
    println!("\x1b[2K\x1b[33m{match_settings}: \x1b[39mattempt {attempt} failed, retrying\x1b[0G");
}

fn print_failure(match_settings: &MatchSettings, reason: &str) {
    // clear line, red match and error, start of line
    println!("\x1b[2K\x1b[31m{match_settings}: {reason}\x1b[39m\x1b[0G");
}

fn print_running_matches(running: &[MatchSettings]) {
    // clear, green, default, start of line
    print!(
        "\x1b[2K\x1b[32mRunning...:\x1b[39m {}\x1b[0G",
        running
            .iter()
            .map(MatchSettings::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );
    let _ = std::io::Write::flush(&mut std::io::stdout());
}

fn disable_line_wrap() {
    print!("\x1b[?7l");
}

fn enable_line_wrap() {
    print!("\x1b[?7h");
}
