//! Turning free-form transcripts into outcomes.
//!
//! The heuristics here are part of the game rules: the keyword list, the four-message window,
//! the two-indicator minimum and the 5% spread threshold decide whether a negotiation counts as
//! closed, so they must not drift.

use std::sync::LazyLock;

use regex::Regex;

use crate::agent::Agent;
use crate::conversation::{ConversationEngine, Message, Transcript};
use crate::error::TransportError;
use crate::scoring::Decision;

/// Words suggesting both parties settled.
pub const AGREEMENT_INDICATORS: [&str; 9] = [
    "agree",
    "accepted",
    "deal",
    "settled",
    "confirmed",
    "final",
    "conclude",
    "complete",
    "done",
];

/// Number of trailing history entries inspected.
const HISTORY_WINDOW: usize = 4;
/// Minimum keyword hits across the window.
const MIN_INDICATORS: usize = 2;
/// Maximum allowed `(max - min) / max` among numbers quoted in the window.
const MAX_NUMERIC_SPREAD: f64 = 0.05;

/// Keyword announcing the private decision in a cheap-talk game.
pub const FINAL_DECISION_KEYWORD: &str = "FINAL_DECISION:";

static NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").expect("valid number regex"));

static FINAL_DECISION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)FINAL_DECISION:\W*(cooperate|defect)").expect("valid decision regex")
});

fn strip_currency(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ','))
        .collect()
}

/// All numbers quoted in `text`, ignoring currency symbols and thousands separators.
pub fn extract_numbers(text: &str) -> Vec<f64> {
    NUMBER
        .find_iter(&strip_currency(text))
        .filter_map(|m| m.as_str().parse().ok())
        .collect()
}

/// Decides whether `message` genuinely closes the negotiation.
///
/// `history` holds the messages said *before* `message`. The phrase must appear literally in
/// `message`. With an empty history that is enough. Otherwise the last four history entries must
/// contain at least two agreement indicators, and the numbers quoted in those entries must lie
/// within 5% of their maximum.
pub fn is_valid_termination(
    message: &str,
    history: &[Message],
    termination_phrase: &str,
) -> bool {
    if !message.contains(termination_phrase) {
        return false;
    }
    if history.is_empty() {
        return true;
    }

    let window = &history[history.len().saturating_sub(HISTORY_WINDOW)..];

    let indicators: usize = window
        .iter()
        .map(|entry| {
            let content = entry.content.to_lowercase();
            AGREEMENT_INDICATORS
                .iter()
                .filter(|word| content.contains(*word))
                .count()
        })
        .sum();
    if indicators < MIN_INDICATORS {
        return false;
    }

    let numbers: Vec<f64> = window
        .iter()
        .flat_map(|entry| extract_numbers(&entry.content))
        .collect();
    if numbers.is_empty() {
        return true;
    }
    let max = numbers.iter().copied().fold(f64::MIN, f64::max);
    let min = numbers.iter().copied().fold(f64::MAX, f64::min);
    max - min <= MAX_NUMERIC_SPREAD * max
}

/// Builds a termination check for [`ConversationEngine`] out of [`is_valid_termination`].
pub fn termination_check(phrase: &str) -> impl Fn(&Message, &Transcript) -> bool + '_ {
    move |message: &Message, history: &Transcript| {
        is_valid_termination(&message.content, history.messages(), phrase)
    }
}

/// Reads the agreed value from an analyzer summary.
///
/// Looks for the first line containing `termination_phrase` and parses the first number after
/// it. Returns `None` when the phrase is absent or not followed by a number, never `0`.
pub fn parse_deal_value(summary: &str, termination_phrase: &str) -> Option<f64> {
    summary
        .lines()
        .filter_map(|line| {
            line.find(termination_phrase)
                .map(|at| &line[at + termination_phrase.len()..])
        })
        .find_map(|tail| {
            NUMBER
                .find(&strip_currency(tail))
                .and_then(|m| m.as_str().parse().ok())
        })
}

/// Reads a cooperate/defect decision.
///
/// An explicit `FINAL_DECISION: <word>` wins. Otherwise the rightmost of the two words found
/// anywhere in `text` is taken.
pub fn parse_binary_decision(text: &str) -> Option<Decision> {
    if let Some(word) = FINAL_DECISION
        .captures_iter(text)
        .last()
        .and_then(|c| c.get(1))
    {
        return Decision::from_word(word.as_str());
    }

    let lowered = text.to_lowercase();
    let cooperate = lowered.rfind("cooperate");
    let defect = lowered.rfind("defect");
    match (cooperate, defect) {
        (Some(c), Some(d)) if c > d => Some(Decision::Cooperate),
        (Some(_), Some(_)) => Some(Decision::Defect),
        (Some(_), None) => Some(Decision::Cooperate),
        (None, Some(_)) => Some(Decision::Defect),
        (None, None) => None,
    }
}

/// Asks `analyzer` to summarize `transcript` and parses the deal value from its answer.
///
/// Returns the raw summary alongside the value so it can be stored with the transcript.
pub fn extract_deal_value(
    engine: &ConversationEngine<'_>,
    analyzer: &Agent,
    transcript: &Transcript,
    summary_termination_phrase: &str,
) -> Result<(String, Option<f64>), TransportError> {
    let summary = engine.single_decision(analyzer, &transcript.render())?;
    let value = parse_deal_value(&summary, summary_termination_phrase);
    Ok((summary, value))
}
