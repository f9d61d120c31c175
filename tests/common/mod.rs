#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use negotiation_tournament::configuration::DEFAULT_SUMMARY_PROMPT;
use negotiation_tournament::error::TransportError;
use negotiation_tournament::prelude::*;
use negotiation_tournament::transport::ChatRequest;

pub const GAME_ID: &str = "game-1";

/// Plays a well-behaved negotiator converging on 80, an analyzer and a cooperative prisoner.
#[derive(Default)]
pub struct Bot;

impl ChatTransport for Bot {
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, TransportError> {
        if request.system_prompt == DEFAULT_SUMMARY_PROMPT {
            return Ok("Both parties agreed on the price.\nThe value agreed was $80".to_owned());
        }
        if let Some(last) = request.messages.last() {
            if last.content.contains("FINAL_DECISION") {
                return Ok("We promised each other. FINAL_DECISION: cooperate".to_owned());
            }
        }
        let reply = match request.messages.len() {
            0 => "I offer 80",
            1 => "Deal, I agree to 80",
            _ => "Agreed at 80, deal done. Pleasure doing business with you",
        };
        Ok(reply.to_owned())
    }
}

/// Fails the first `failures` calls with `error`, then behaves like [`Bot`].
pub struct Flaky {
    failures: AtomicU32,
    error: TransportError,
}

impl Flaky {
    pub fn new(failures: u32) -> Self {
        Self::with_error(
            failures,
            TransportError::Http("connection reset by peer".to_owned()),
        )
    }

    pub fn with_error(failures: u32, error: TransportError) -> Self {
        Flaky {
            failures: AtomicU32::new(failures),
            error,
        }
    }
}

impl ChatTransport for Flaky {
    fn complete(&self, request: &ChatRequest<'_>) -> Result<String, TransportError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            Err(self.error.clone())
        } else {
            Bot.complete(request)
        }
    }
}

/// Always fails with `error`.
pub struct Broken(pub TransportError);

impl ChatTransport for Broken {
    fn complete(&self, _request: &ChatRequest<'_>) -> Result<String, TransportError> {
        Err(self.0.clone())
    }
}

pub fn car_sale() -> GameKind {
    GameKind::Negotiation(NegotiationGame {
        role1_name: "Buyer".into(),
        role2_name: "Seller".into(),
        description: "A used car is for sale.".into(),
        minimizer: Role::Role1,
    })
}

pub fn config() -> Configuration {
    Configuration::new()
        .with_verbose(false)
        .with_max_turns(4)
        .with_max_parallel_matches(1)
}

/// A store holding a submission and values for groups `1..=count` of class A.
pub fn store_with_teams(count: u32) -> (Arc<InMemoryStore>, Vec<TeamId>) {
    let store = InMemoryStore::new();
    let teams: Vec<TeamId> = (1..=count).map(|group| TeamId::new("A", group)).collect();
    for team in &teams {
        store.insert_prompt(
            GAME_ID,
            team,
            format!("You are team {team}, buy cheap.#_;:)You are team {team}, sell dear."),
        );
        store.insert_values(
            GAME_ID,
            team,
            GroupValues {
                minimizer_value: 100.0,
                maximizer_value: 60.0,
            },
        );
    }
    (Arc::new(store), teams)
}

pub fn orchestrator(
    transport: impl ChatTransport + 'static,
    store: &Arc<InMemoryStore>,
    game: GameKind,
    config: Configuration,
) -> Orchestrator {
    Orchestrator::new(Arc::new(transport), store.clone(), game, config)
}
