//! Berger round-robin pairing.
//!
//! Seats are shuffled once, then each round pairs seat `i` with seat `n - 1 - i`. Between rounds
//! the first seat stays fixed while every other seat moves one step (the last one comes back
//! right after the fixed seat). With an odd number of teams a bye seat is added, and whoever
//! faces it sits the round out.

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::trace;

/// Two distinct participants meeting in one round.
pub type Pairing<T> = (T, T);

/// All pairings of one round. No participant appears twice.
pub type Round<T> = Vec<Pairing<T>>;

/// Builds `num_rounds` rounds of pairings for `teams` with a fresh random seeding.
///
/// `teams` is not modified. Zero or negative `num_rounds` gives an empty schedule.
pub fn schedule<T: Clone>(teams: &[T], num_rounds: i32) -> Vec<Round<T>> {
    schedule_with_rng(teams, num_rounds, &mut rand::thread_rng())
}

/// Same as [`schedule`] with a caller-provided random source.
pub fn schedule_with_rng<T: Clone, R: Rng + ?Sized>(
    teams: &[T],
    num_rounds: i32,
    rng: &mut R,
) -> Vec<Round<T>> {
    if num_rounds <= 0 || teams.len() < 2 {
        return vec![];
    }

    // `None` is the bye seat
    let mut seats: Vec<Option<T>> = teams.iter().cloned().map(Some).collect();
    if seats.len() % 2 == 1 {
        seats.push(None);
    }
    seats.shuffle(rng);

    let n = seats.len();
    let mut rounds = Vec::with_capacity(num_rounds as usize);
    for round in 0..num_rounds {
        let pairings: Round<T> = (0..n / 2)
            .filter_map(|i| match (&seats[i], &seats[n - 1 - i]) {
                (Some(a), Some(b)) => Some((a.clone(), b.clone())),
                _ => None,
            })
            .collect();
        trace!(round, pairings = pairings.len(), "round scheduled");
        rounds.push(pairings);

        if let Some(last) = seats.pop() {
            seats.insert(1, last);
        }
    }
    rounds
}
