//! Pure scoring functions.
//!
//! [`compute_deal_score`] maps an agreed value and the two private reservation values to a pair
//! of normalized scores. [`compute_payoff`] looks up a 2x2 payoff table for cheap-talk games.

use std::collections::HashMap;
use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Scores of both sides of a negotiation, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DealScore {
    /// Score of the maximizer, who wants a high deal and whose reservation value is the floor
    pub high: f64,
    /// Score of the minimizer, who wants a low deal and whose reservation value is the ceiling
    pub low: f64,
}

impl DealScore {
    /// No agreement.
    pub const NONE: DealScore = DealScore { high: 0.0, low: 0.0 };
    /// Everything to the high side.
    pub const HIGH_WINS: DealScore = DealScore { high: 1.0, low: 0.0 };
    /// Everything to the low side.
    pub const LOW_WINS: DealScore = DealScore { high: 0.0, low: 1.0 };
}

fn round_to(value: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision as i32);
    (value * factor).round() / factor
}

/// Scores a deal.
///
/// `upper_bound_value` is the minimizer's reservation value, the ceiling of the bargaining range,
/// and `lower_bound_value` the maximizer's, its floor. In the normal orientation (`upper >= lower`) a deal at or
/// above the ceiling gives everything to the high side, at or below the floor everything to the
/// low side, and anything in between is split linearly, rounded to `precision` decimals.
///
/// When the bounds are crossed there is no surplus to share: deals outside the range still go
/// entirely to one side, a deal landing exactly on either bound scores `(0, 0)`, and the rest is
/// split by the same linear rule.
///
/// A missing or non-finite `deal` means no agreement and scores `(0, 0)`.
pub fn compute_deal_score(
    deal: Option<f64>,
    upper_bound_value: f64,
    lower_bound_value: f64,
    precision: u32,
) -> DealScore {
    let Some(deal) = deal.filter(|d| d.is_finite()) else {
        return DealScore::NONE;
    };
    let (upper, lower) = (upper_bound_value, lower_bound_value);

    if upper >= lower {
        if deal >= upper {
            return DealScore::HIGH_WINS;
        }
        if deal <= lower {
            return DealScore::LOW_WINS;
        }
    } else {
        if deal < upper {
            return DealScore::LOW_WINS;
        }
        if deal > lower {
            return DealScore::HIGH_WINS;
        }
        if deal == upper || deal == lower {
            return DealScore::NONE;
        }
    }

    let ratio = ((deal - upper) / (lower - upper)).clamp(0.0, 1.0);
    let low = round_to(ratio, precision);
    DealScore {
        high: round_to(1.0 - low, precision),
        low,
    }
}

/// Private move of a cheap-talk game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    /// Stay silent
    Cooperate,
    /// Betray
    Defect,
}

impl Decision {
    /// Parses `"cooperate"` or `"defect"`, ignoring case and surrounding whitespace.
    pub fn from_word(word: &str) -> Option<Decision> {
        match word.trim().to_ascii_lowercase().as_str() {
            "cooperate" => Some(Decision::Cooperate),
            "defect" => Some(Decision::Defect),
            _ => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Decision::Cooperate => "cooperate",
            Decision::Defect => "defect",
        }
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 2x2 payoff table keyed by `"<action_a>_<action_b>"`, each entry holding `(payoff_a, payoff_b)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PayoffMatrix(pub HashMap<String, (f64, f64)>);

impl PayoffMatrix {
    /// Builds the table from the four outcomes, seen from player A.
    pub fn new(
        both_cooperate: (f64, f64),
        a_cooperates_b_defects: (f64, f64),
        a_defects_b_cooperates: (f64, f64),
        both_defect: (f64, f64),
    ) -> Self {
        let mut table = HashMap::with_capacity(4);
        table.insert(Self::key(Decision::Cooperate, Decision::Cooperate), both_cooperate);
        table.insert(Self::key(Decision::Cooperate, Decision::Defect), a_cooperates_b_defects);
        table.insert(Self::key(Decision::Defect, Decision::Cooperate), a_defects_b_cooperates);
        table.insert(Self::key(Decision::Defect, Decision::Defect), both_defect);
        Self(table)
    }

    /// Lookup key of an action pair.
    pub fn key(a: Decision, b: Decision) -> String {
        format!("{a}_{b}")
    }
}

impl Default for PayoffMatrix {
    /// The classic prisoner's dilemma: temptation 5, reward 3, punishment 1, sucker 0.
    fn default() -> Self {
        Self::new((3.0, 3.0), (0.0, 5.0), (5.0, 0.0), (1.0, 1.0))
    }
}

/// Payoffs of both players. Unparsed decisions or a missing table entry give `(0, 0)`.
pub fn compute_payoff(
    a: Option<Decision>,
    b: Option<Decision>,
    matrix: &PayoffMatrix,
) -> (f64, f64) {
    match (a, b) {
        (Some(a), Some(b)) => matrix
            .0
            .get(&PayoffMatrix::key(a, b))
            .copied()
            .unwrap_or((0.0, 0.0)),
        _ => (0.0, 0.0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(deal: Option<f64>, upper: f64, lower: f64) -> (f64, f64) {
        let s = compute_deal_score(deal, upper, lower, 2);
        (s.high, s.low)
    }

    #[test]
    fn no_deal_scores_nothing() {
        assert_eq!(score(None, 100.0, 50.0), (0.0, 0.0));
        assert_eq!(score(Some(f64::NAN), 100.0, 50.0), (0.0, 0.0));
    }

    #[test]
    fn bounds_in_normal_orientation() {
        assert_eq!(score(Some(100.0), 100.0, 50.0), (1.0, 0.0));
        assert_eq!(score(Some(50.0), 100.0, 50.0), (0.0, 1.0));
        assert_eq!(score(Some(150.0), 100.0, 50.0), (1.0, 0.0));
        assert_eq!(score(Some(10.0), 100.0, 50.0), (0.0, 1.0));
    }

    #[test]
    fn linear_split_sums_to_one() {
        assert_eq!(score(Some(75.0), 100.0, 50.0), (0.5, 0.5));
        assert_eq!(score(Some(90.0), 100.0, 50.0), (0.8, 0.2));
        for deal in [51.0, 63.3, 77.7, 99.9] {
            let (high, low) = score(Some(deal), 100.0, 50.0);
            assert!((high + low - 1.0).abs() < 1e-9, "{deal}: {high} + {low}");
            assert!((0.0..=1.0).contains(&high) && (0.0..=1.0).contains(&low));
        }
    }

    #[test]
    fn precision_rounds_the_split() {
        let s = compute_deal_score(Some(60.0), 90.0, 0.0, 3);
        assert_eq!((s.high, s.low), (0.667, 0.333));
    }

    #[test]
    fn crossed_bounds() {
        // upper side 50, lower side 100: no bargaining range
        assert_eq!(score(Some(40.0), 50.0, 100.0), (0.0, 1.0));
        assert_eq!(score(Some(120.0), 50.0, 100.0), (1.0, 0.0));
        assert_eq!(score(Some(50.0), 50.0, 100.0), (0.0, 0.0));
        assert_eq!(score(Some(100.0), 50.0, 100.0), (0.0, 0.0));
        assert_eq!(score(Some(75.0), 50.0, 100.0), (0.5, 0.5));
    }

    #[test]
    fn default_matrix_is_prisoners_dilemma() {
        let m = PayoffMatrix::default();
        use Decision::*;
        assert_eq!(compute_payoff(Some(Cooperate), Some(Cooperate), &m), (3.0, 3.0));
        assert_eq!(compute_payoff(Some(Cooperate), Some(Defect), &m), (0.0, 5.0));
        assert_eq!(compute_payoff(Some(Defect), Some(Cooperate), &m), (5.0, 0.0));
        assert_eq!(compute_payoff(Some(Defect), Some(Defect), &m), (1.0, 1.0));
        assert_eq!(compute_payoff(None, Some(Defect), &m), (0.0, 0.0));
    }

    #[test]
    fn missing_entry_scores_nothing() {
        let m = PayoffMatrix(HashMap::new());
        assert_eq!(
            compute_payoff(Some(Decision::Defect), Some(Decision::Defect), &m),
            (0.0, 0.0)
        );
    }
}
