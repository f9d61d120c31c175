//! # Negotiation Tournament
//!
//! Round-based tournaments between LLM-backed agents written by student teams.
//!
//! It provides:
//! - Bilateral and multilateral conversations between agents over any chat-completion API
//!   ([`ChatTransport`](crate::transport::ChatTransport))
//! - Negotiation games, where an analyzer agent extracts the agreed value and each team is
//!   scored against its private reservation value
//! - Cheap-talk games (prisoner's dilemma), where each agent privately decides after talking
//! - Round-robin scheduling with the Berger circle method
//! - Bounded-parallel execution with retries, progress events and a structured run summary
//!   ([`Orchestrator`](crate::orchestrator::Orchestrator))
//!
//! Every match runs on its own thread. Failed matches are recorded through the
//! [`GameStore`](crate::storage::GameStore) and can be played again with
//! [`Orchestrator::run_error_matchups`](crate::orchestrator::Orchestrator::run_error_matchups).
//!
//! # Documentation Overview
//!
//! - For the run lifecycle, retries and the returned summary, see the [`orchestrator`] module.
//! - For tuning the run (model, turns, rounds, parallelism), see
//!   [`Configuration`](crate::configuration::Configuration).
//! - For the conversation loop and how each agent sees the transcript, see [`conversation`].
//! - For termination detection and value extraction, see [`outcome`]; for scores, see
//!   [`scoring`].
//! - For plugging in a database, implement [`GameStore`](crate::storage::GameStore).
//!
//! # Usage Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use negotiation_tournament::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = Configuration::from_env().with_num_rounds(3);
//!     let transport = OpenAiTransport::from_env(config.request_timeout())?;
//!
//!     // Submissions and reservation values are normally loaded from a database
//!     let store = InMemoryStore::new();
//!     let teams = [TeamId::new("A", 1), TeamId::new("A", 2), TeamId::new("A", 3)];
//!     for team in &teams {
//!         store.insert_prompt("game-1", team, "You buy cars.#_;:)You sell cars.");
//!         store.insert_values(
//!             "game-1",
//!             team,
//!             GroupValues { minimizer_value: 100.0, maximizer_value: 60.0 },
//!         );
//!     }
//!
//!     let game = GameKind::Negotiation(NegotiationGame {
//!         role1_name: "Buyer".into(),
//!         role2_name: "Seller".into(),
//!         description: "A used car is for sale.".into(),
//!         minimizer: Role::Role1,
//!     });
//!     let orchestrator = Orchestrator::new(Arc::new(transport), Arc::new(store), game, config);
//!
//!     let summary = orchestrator.run("game-1", &teams, &mut |event: &ProgressEvent| {
//!         eprintln!("{}/{} {}", event.completed, event.total, event.phase);
//!     });
//!     println!("{}", summary.message);
//!
//!     for standing in compute_standings(&summary.results) {
//!         println!("{standing}");
//!     }
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]

pub use anyhow;

pub mod agent;
pub mod configuration;
pub mod conversation;
pub mod diagnostics;
pub mod error;
pub mod game;
mod logger;
mod match_queue;
pub mod match_runner;
pub mod orchestrator;
pub mod outcome;
pub mod progress;
pub mod scoring;
pub mod standings;
pub mod storage;
pub mod team_collector;
pub mod tournament_scheduler;
pub mod transport;

/// Commonly used types and traits for quick access.
///
/// Import this prelude to get started easily:
/// ```rust
/// use negotiation_tournament::prelude::*;
/// ```
///
/// Includes:
/// - [`Configuration`](crate::configuration::Configuration)
/// - [`Orchestrator`](crate::orchestrator::Orchestrator) and its [`RunSummary`](crate::orchestrator::RunSummary)
/// - the game kinds of [`game`](crate::game)
/// - [`OpenAiTransport`](crate::transport::OpenAiTransport) and [`InMemoryStore`](crate::storage::InMemoryStore)
pub mod prelude {
    pub use crate::agent::{Agent, Role, TeamId};
    pub use crate::configuration::Configuration;
    pub use crate::game::{DilemmaGame, GameKind, NegotiationGame};
    pub use crate::orchestrator::{Orchestrator, RunStatus, RunSummary};
    pub use crate::progress::{NoProgress, Phase, ProgressEvent, ProgressObserver};
    pub use crate::scoring::{Decision, PayoffMatrix};
    pub use crate::standings::compute_standings;
    pub use crate::storage::{GameStore, GroupValues, InMemoryStore};
    pub use crate::transport::{ChatTransport, OpenAiTransport};
}
