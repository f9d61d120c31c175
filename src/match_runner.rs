//! One match: conversation, outcome extraction and scoring.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::agent::{Agent, Role, Team};
use crate::configuration::Configuration;
use crate::conversation::{ConversationEngine, Transcript};
use crate::diagnostics::TimingTotals;
use crate::error::MatchError;
use crate::game::{DilemmaGame, GameKind, NegotiationGame};
use crate::outcome::{
    extract_deal_value, parse_binary_decision, termination_check, FINAL_DECISION_KEYWORD,
};
use crate::scoring::{compute_deal_score, compute_payoff, Decision};
use crate::transport::ChatTransport;

/// Decimals kept in negotiation scores.
const SCORE_PRECISION: u32 = 2;

/// Name of the agent summarizing negotiations.
const ANALYZER_NAME: &str = "Analyzer";

/// One match to play: `team_a` holds role 1 (first seat), `team_b` role 2.
#[derive(Debug, Clone)]
pub struct MatchSettings {
    /// Round number, starting at 1
    pub round: u32,
    /// Team in role 1
    pub team_a: Arc<Team>,
    /// Team in role 2
    pub team_b: Arc<Team>,
}

impl PartialEq for MatchSettings {
    fn eq(&self, other: &Self) -> bool {
        self.round == other.round
            && self.team_a.id == other.team_a.id
            && self.team_b.id == other.team_b.id
    }
}

impl Display for MatchSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[R{} {} VS {}]",
            self.round, self.team_a.id, self.team_b.id
        )
    }
}

/// What a match was decided on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Outcome {
    /// Negotiation: the agreed value, `None` when no agreement was reached
    Deal(Option<f64>),
    /// Cheap talk: the private decisions of `team_a` and `team_b`
    Decisions(Option<Decision>, Option<Decision>),
}

impl Outcome {
    /// Whether the match reached a usable conclusion.
    pub fn is_agreement(&self) -> bool {
        match self {
            Outcome::Deal(value) => value.is_some(),
            Outcome::Decisions(a, b) => a.is_some() && b.is_some(),
        }
    }

    /// Agreed value, for negotiations.
    pub fn deal_value(&self) -> Option<f64> {
        match self {
            Outcome::Deal(value) => *value,
            Outcome::Decisions(..) => None,
        }
    }
}

/// Result of one successful attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Everything the agents said
    pub transcript: Transcript,
    /// Analyzer summary, or the decisions of a cheap-talk game
    pub summary: String,
    /// What was decided
    pub outcome: Outcome,
    /// Score of `team_a`
    pub score_a: f64,
    /// Score of `team_b`
    pub score_b: f64,
    /// Messages in the transcript
    pub turns_taken: usize,
    /// Time spent in conversation and extraction
    pub timing: TimingTotals,
}

/// Plays one attempt of a match. Transport errors are returned for the caller to retry.
#[instrument(skip_all, fields(%settings))]
pub fn run_match(
    settings: &MatchSettings,
    game: &GameKind,
    config: &Configuration,
    transport: &dyn ChatTransport,
) -> Result<MatchResult, MatchError> {
    let model = config.model_settings();
    let engine = ConversationEngine::new(transport, &model);
    match game {
        GameKind::Negotiation(game) => run_negotiation(settings, game, config, &engine),
        GameKind::PrisonersDilemma(game) => run_dilemma(settings, game, config, &engine),
    }
}

fn role_agent(team: &Team, role: Role, game: &NegotiationGame) -> Result<Agent, MatchError> {
    let agent = team.agent(role).ok_or_else(|| MatchError::MissingAgent {
        team: team.name(),
        role: game.role_name(role).to_owned(),
    })?;
    let context = format!(
        "{}\n\nYou are the {}. Your reservation value is {}. Never reveal it.",
        game.description,
        game.role_name(role),
        team.reservation_values.get(role)
    );
    Ok(agent.with_context(&context))
}

fn run_negotiation(
    settings: &MatchSettings,
    game: &NegotiationGame,
    config: &Configuration,
    engine: &ConversationEngine<'_>,
) -> Result<MatchResult, MatchError> {
    let mut timing = TimingTotals::default();
    let agents = [
        role_agent(&settings.team_a, Role::Role1, game)?,
        role_agent(&settings.team_b, Role::Role2, game)?,
    ];
    let opener = config.conversation_starter;

    let start = Instant::now();
    let check = termination_check(&config.negotiation_termination_phrase);
    let conversation = engine.run_bilateral(
        &agents[opener.index()],
        &agents[opener.other().index()],
        config.max_turns,
        Some(&check),
    )?;
    TimingTotals::add(&mut timing.conversation_secs, start.elapsed());

    let (summary, deal_value) = if conversation.terminated {
        let start = Instant::now();
        let analyzer = Agent::new(ANALYZER_NAME, config.summary_prompt.clone());
        let extracted = extract_deal_value(
            engine,
            &analyzer,
            &conversation.transcript,
            &config.summary_termination_phrase,
        )?;
        TimingTotals::add(&mut timing.extraction_secs, start.elapsed());
        extracted
    } else {
        debug!("no valid termination within {} turns", config.max_turns);
        (
            format!("No agreement within {} turns", config.max_turns),
            None,
        )
    };

    let minimizer = game.minimizer;
    let team_for = |role: Role| match role {
        Role::Role1 => &settings.team_a,
        Role::Role2 => &settings.team_b,
    };
    let minimizer_value = team_for(minimizer).reservation_values.get(minimizer);
    let maximizer_value = team_for(minimizer.other())
        .reservation_values
        .get(minimizer.other());
    let score = compute_deal_score(deal_value, minimizer_value, maximizer_value, SCORE_PRECISION);
    let (score_a, score_b) = match minimizer {
        Role::Role1 => (score.low, score.high),
        Role::Role2 => (score.high, score.low),
    };
    debug!(?deal_value, score_a, score_b);

    Ok(MatchResult {
        turns_taken: conversation.transcript.len(),
        transcript: conversation.transcript,
        summary,
        outcome: Outcome::Deal(deal_value),
        score_a,
        score_b,
        timing,
    })
}

fn run_dilemma(
    settings: &MatchSettings,
    game: &DilemmaGame,
    config: &Configuration,
    engine: &ConversationEngine<'_>,
) -> Result<MatchResult, MatchError> {
    let mut timing = TimingTotals::default();
    let context = format!("{}\n\nYou are a {}.", game.description, game.player_name);
    let agents = [
        settings.team_a.role1_agent.with_context(&context),
        settings.team_b.role1_agent.with_context(&context),
    ];
    let opener = config.conversation_starter;

    let start = Instant::now();
    let conversation = engine.run_bilateral(
        &agents[opener.index()],
        &agents[opener.other().index()],
        config.max_turns,
        None,
    )?;
    TimingTotals::add(&mut timing.conversation_secs, start.elapsed());

    let start = Instant::now();
    let prompt = decision_prompt(game, &conversation.transcript);
    let answer_a = engine.single_decision(&agents[0], &prompt)?;
    let answer_b = engine.single_decision(&agents[1], &prompt)?;
    TimingTotals::add(&mut timing.extraction_secs, start.elapsed());

    let decision_a = parse_binary_decision(&answer_a);
    let decision_b = parse_binary_decision(&answer_b);
    let (score_a, score_b) = compute_payoff(decision_a, decision_b, &game.payoffs);
    debug!(?decision_a, ?decision_b, score_a, score_b);

    let show = |d: Option<Decision>| d.map_or_else(|| "unparsed".to_owned(), |d| d.to_string());
    let summary = format!(
        "{}: {}\n{}: {}",
        settings.team_a.id,
        show(decision_a),
        settings.team_b.id,
        show(decision_b)
    );

    Ok(MatchResult {
        turns_taken: conversation.transcript.len(),
        transcript: conversation.transcript,
        summary,
        outcome: Outcome::Decisions(decision_a, decision_b),
        score_a,
        score_b,
        timing,
    })
}

fn decision_prompt(game: &DilemmaGame, transcript: &Transcript) -> String {
    format!(
        "{}\n\nConversation:\n{}\n\nEnd your answer with '{FINAL_DECISION_KEYWORD} cooperate' \
         or '{FINAL_DECISION_KEYWORD} defect'.",
        game.decision_prompt,
        transcript.render()
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::agent::{ReservationValues, TeamId};
    use crate::error::TransportError;
    use crate::transport::ChatRequest;

    /// Replies with a fixed script, one entry per call.
    struct Script(Mutex<Vec<&'static str>>);

    impl Script {
        fn new(lines: &[&'static str]) -> Self {
            Self(Mutex::new(lines.iter().rev().copied().collect()))
        }
    }

    impl ChatTransport for Script {
        fn complete(&self, _request: &ChatRequest<'_>) -> Result<String, TransportError> {
            self.0
                .lock()
                .unwrap()
                .pop()
                .map(str::to_owned)
                .ok_or(TransportError::EmptyResponse)
        }
    }

    fn team(group: u32, role1: f64, role2: f64) -> Arc<Team> {
        let id = TeamId::new("A", group);
        Arc::new(Team {
            reservation_values: ReservationValues { role1, role2 },
            role1_agent: Agent::new(format!("{id}_Buyer"), "buy low"),
            role2_agent: Some(Agent::new(format!("{id}_Seller"), "sell high")),
            id,
        })
    }

    fn negotiation() -> GameKind {
        GameKind::Negotiation(NegotiationGame {
            role1_name: "Buyer".into(),
            role2_name: "Seller".into(),
            description: "A used car is for sale.".into(),
            minimizer: Role::Role1,
        })
    }

    fn settings() -> MatchSettings {
        MatchSettings {
            round: 1,
            // buyer pays at most 100, seller accepts at least 60
            team_a: team(1, 100.0, 0.0),
            team_b: team(2, 0.0, 60.0),
        }
    }

    #[test]
    fn negotiation_is_scored_from_the_summary() {
        let transport = Script::new(&[
            "I can do 88",
            "I want 90, final offer",
            "Deal, I agree to 90",
            "Agreed at 90. Pleasure doing business with you",
            "Both agreed.\nThe value agreed was $90",
        ]);
        let config = Configuration::new().with_max_turns(5).with_verbose(false);
        let result = run_match(&settings(), &negotiation(), &config, &transport).unwrap();

        assert_eq!(result.turns_taken, 4);
        assert_eq!(result.outcome, Outcome::Deal(Some(90.0)));
        // seller gets (90 - 60) / (100 - 60)
        assert_eq!(result.score_b, 0.75);
        assert_eq!(result.score_a, 0.25);
    }

    #[test]
    fn exhausted_turns_mean_no_agreement() {
        let transport = Script::new(&["70?", "90.", "75?"]);
        let config = Configuration::new().with_max_turns(1);
        let result = run_match(&settings(), &negotiation(), &config, &transport).unwrap();
        assert_eq!(result.turns_taken, 3);
        assert_eq!(result.outcome, Outcome::Deal(None));
        assert_eq!((result.score_a, result.score_b), (0.0, 0.0));
    }

    #[test]
    fn transport_failure_is_an_error() {
        let transport = Script::new(&["hello"]);
        let config = Configuration::new().with_max_turns(2);
        let err = run_match(&settings(), &negotiation(), &config, &transport).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn dilemma_uses_private_decisions() {
        let transport = Script::new(&[
            "Let's both cooperate",
            "Sure",
            "Okay then",
            "I will defect. FINAL_DECISION: defect",
            "FINAL_DECISION: cooperate",
        ]);
        let config = Configuration::new().with_max_turns(1);
        let game = GameKind::PrisonersDilemma(DilemmaGame::default());
        let result = run_match(&settings(), &game, &config, &transport).unwrap();

        assert_eq!(
            result.outcome,
            Outcome::Decisions(Some(Decision::Defect), Some(Decision::Cooperate))
        );
        assert_eq!((result.score_a, result.score_b), (5.0, 0.0));
        assert_eq!(result.turns_taken, 3);
        assert!(result.summary.contains("defect"));
    }
}
