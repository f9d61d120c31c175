//! Turn-by-turn dialogue between agents.
//!
//! The [`ConversationEngine`] drives either a two-party exchange ([`run_bilateral`]) or an N-party
//! conversation with a rotating speaker ([`run_multilateral`]). Every call to the model is made
//! from the speaking agent's *perspective*: its own earlier messages are replayed as `assistant`
//! turns, everybody else's as `user` turns.
//!
//! Transport errors are returned as-is. Retrying a match is the orchestrator's job.
//!
//! [`run_bilateral`]: ConversationEngine::run_bilateral
//! [`run_multilateral`]: ConversationEngine::run_multilateral

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::agent::Agent;
use crate::error::TransportError;
use crate::transport::{ChatMessage, ChatRequest, ChatTransport, ModelSettings};

/// One utterance of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Name of the agent who said it
    pub speaker_name: String,
    /// What was said
    pub content: String,
}

impl Message {
    /// Creates a message.
    pub fn new(speaker_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            speaker_name: speaker_name.into(),
            content: content.into(),
        }
    }
}

/// Append-only, ordered list of messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
}

impl Transcript {
    /// An empty transcript.
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages, oldest first.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// `true` if nothing was said.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Latest message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Appends a message. There is no way to edit or remove one.
    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// The transcript as `speaker: content` lines, one block per message.
    pub fn render(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("{}: {}", m.speaker_name, m.content))
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Builds the message list `agent_name` sees when it is its turn to speak.
    pub fn perspective(&self, agent_name: &str) -> Vec<ChatMessage> {
        self.messages
            .iter()
            .map(|m| {
                if m.speaker_name == agent_name {
                    ChatMessage::assistant(m.content.clone())
                } else {
                    ChatMessage::user(m.content.clone())
                }
            })
            .collect()
    }
}

impl From<Vec<Message>> for Transcript {
    fn from(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

/// Called after every generated message with that message and the transcript that preceded it.
/// Returning `true` ends the conversation immediately.
pub type Termination<'a> = &'a dyn Fn(&Message, &Transcript) -> bool;

/// Picks the index of the next speaker given the transcript so far.
pub type SpeakerOrder<'a> = &'a mut dyn FnMut(&Transcript) -> usize;

/// A finished conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Everything that was said
    pub transcript: Transcript,
    /// `true` if the termination check fired, `false` if the turn budget ran out
    pub terminated: bool,
}

/// Runs dialogues through a [`ChatTransport`].
pub struct ConversationEngine<'a> {
    transport: &'a dyn ChatTransport,
    settings: &'a ModelSettings,
}

impl<'a> ConversationEngine<'a> {
    /// Creates an engine calling `transport` with `settings`.
    pub fn new(transport: &'a dyn ChatTransport, settings: &'a ModelSettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    fn speak(&self, agent: &Agent, transcript: &Transcript) -> Result<Message, TransportError> {
        let perspective = transcript.perspective(&agent.name);
        let content = self.transport.complete(&ChatRequest {
            system_prompt: &agent.system_message,
            messages: &perspective,
            settings: self.settings,
        })?;
        trace!(speaker = %agent.name, turn = transcript.len(), "message generated");
        Ok(Message::new(agent.name.clone(), content))
    }

    /// Appends the next message of `agent` and reports whether the conversation must stop.
    fn step(
        &self,
        agent: &Agent,
        transcript: &mut Transcript,
        termination: Option<Termination<'_>>,
    ) -> Result<bool, TransportError> {
        let message = self.speak(agent, transcript)?;
        let stop = termination.is_some_and(|check| check(&message, &*transcript));
        transcript.push(message);
        Ok(stop)
    }

    /// Two agents alternating, `opener` first.
    ///
    /// After the opening message, at most `max_turns` exchanges follow, an exchange being one
    /// reply from `responder` and one from `opener`.
    pub fn run_bilateral(
        &self,
        opener: &Agent,
        responder: &Agent,
        max_turns: usize,
        termination: Option<Termination<'_>>,
    ) -> Result<Conversation, TransportError> {
        let mut transcript = Transcript::new();

        if self.step(opener, &mut transcript, termination)? {
            return Ok(Conversation {
                transcript,
                terminated: true,
            });
        }

        for _ in 0..max_turns {
            for agent in [responder, opener] {
                if self.step(agent, &mut transcript, termination)? {
                    return Ok(Conversation {
                        transcript,
                        terminated: true,
                    });
                }
            }
        }

        Ok(Conversation {
            transcript,
            terminated: false,
        })
    }

    /// Any number of agents; `agents[opener]` speaks first, then `max_turns` more messages.
    ///
    /// Without `speaker_order`, speakers rotate through `agents` starting right after the
    /// opener. A custom order returning an out-of-range index wraps around.
    pub fn run_multilateral(
        &self,
        agents: &[Agent],
        opener: usize,
        max_turns: usize,
        mut speaker_order: Option<SpeakerOrder<'_>>,
        termination: Option<Termination<'_>>,
    ) -> Result<Conversation, TransportError> {
        let mut transcript = Transcript::new();
        if agents.is_empty() {
            return Ok(Conversation {
                transcript,
                terminated: false,
            });
        }
        let opener = opener % agents.len();

        if self.step(&agents[opener], &mut transcript, termination)? {
            return Ok(Conversation {
                transcript,
                terminated: true,
            });
        }

        let mut next = opener;
        for _ in 0..max_turns {
            next = match speaker_order.as_deref_mut() {
                Some(order) => order(&transcript) % agents.len(),
                None => (next + 1) % agents.len(),
            };
            if self.step(&agents[next], &mut transcript, termination)? {
                return Ok(Conversation {
                    transcript,
                    terminated: true,
                });
            }
        }

        Ok(Conversation {
            transcript,
            terminated: false,
        })
    }

    /// A one-shot question to `agent`, outside of any conversation.
    pub fn single_decision(
        &self,
        agent: &Agent,
        user_message: &str,
    ) -> Result<String, TransportError> {
        let messages = [ChatMessage::user(user_message)];
        self.transport.complete(&ChatRequest {
            system_prompt: &agent.system_message,
            messages: &messages,
            settings: self.settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::transport::ChatRole;

    /// Answers `"<system prompt> #<n>"` and records every request it saw.
    #[derive(Default)]
    struct Echo {
        seen: Mutex<Vec<(String, Vec<ChatMessage>)>>,
    }

    impl ChatTransport for Echo {
        fn complete(&self, request: &ChatRequest<'_>) -> Result<String, TransportError> {
            let mut seen = self.seen.lock().unwrap();
            seen.push((request.system_prompt.to_owned(), request.messages.to_vec()));
            Ok(format!("{} #{}", request.system_prompt, seen.len()))
        }
    }

    struct Broken;

    impl ChatTransport for Broken {
        fn complete(&self, _request: &ChatRequest<'_>) -> Result<String, TransportError> {
            Err(TransportError::Http("connection reset".into()))
        }
    }

    fn settings() -> ModelSettings {
        ModelSettings {
            model: "test".into(),
            temperature: None,
            top_p: None,
        }
    }

    #[test]
    fn perspective_marks_own_messages_as_assistant() {
        let transcript = Transcript::from(vec![
            Message::new("A", "a1"),
            Message::new("B", "b1"),
            Message::new("C", "c1"),
        ]);
        let view = transcript.perspective("B");
        assert_eq!(
            view,
            vec![
                ChatMessage::user("a1"),
                ChatMessage::assistant("b1"),
                ChatMessage::user("c1"),
            ]
        );
    }

    #[test]
    fn bilateral_alternates_and_respects_turn_budget() {
        let echo = Echo::default();
        let settings = settings();
        let engine = ConversationEngine::new(&echo, &settings);
        let (a, b) = (Agent::new("A", "sa"), Agent::new("B", "sb"));

        let conversation = engine.run_bilateral(&a, &b, 2, None).unwrap();
        assert!(!conversation.terminated);
        let speakers: Vec<_> = conversation
            .transcript
            .messages()
            .iter()
            .map(|m| m.speaker_name.as_str())
            .collect();
        assert_eq!(speakers, ["A", "B", "A", "B", "A"]);

        let seen = echo.seen.lock().unwrap();
        // opener starts from an empty perspective
        assert!(seen[0].1.is_empty());
        // B's first reply sees A's opening as a user turn
        assert_eq!(seen[1].1, vec![ChatMessage::user("sa #1")]);
        assert_eq!(seen[2].1[0].role, ChatRole::Assistant);
    }

    #[test]
    fn termination_can_fire_on_opening_message() {
        let echo = Echo::default();
        let settings = settings();
        let engine = ConversationEngine::new(&echo, &settings);
        let (a, b) = (Agent::new("A", "sa"), Agent::new("B", "sb"));
        let stop_now = |_: &Message, history: &Transcript| history.is_empty();

        let conversation = engine.run_bilateral(&a, &b, 5, Some(&stop_now)).unwrap();
        assert!(conversation.terminated);
        assert_eq!(conversation.transcript.len(), 1);
    }

    #[test]
    fn termination_stops_mid_exchange() {
        let echo = Echo::default();
        let settings = settings();
        let engine = ConversationEngine::new(&echo, &settings);
        let (a, b) = (Agent::new("A", "sa"), Agent::new("B", "sb"));
        let stop_on_b = |m: &Message, _: &Transcript| m.speaker_name == "B";

        let conversation = engine.run_bilateral(&a, &b, 5, Some(&stop_on_b)).unwrap();
        assert!(conversation.terminated);
        assert_eq!(conversation.transcript.len(), 2);
    }

    #[test]
    fn multilateral_rotates_after_opener() {
        let echo = Echo::default();
        let settings = settings();
        let engine = ConversationEngine::new(&echo, &settings);
        let agents = [
            Agent::new("A", "sa"),
            Agent::new("B", "sb"),
            Agent::new("C", "sc"),
        ];

        let conversation = engine
            .run_multilateral(&agents, 1, 4, None, None)
            .unwrap();
        let speakers: Vec<_> = conversation
            .transcript
            .messages()
            .iter()
            .map(|m| m.speaker_name.as_str())
            .collect();
        assert_eq!(speakers, ["B", "C", "A", "B", "C"]);
    }

    #[test]
    fn multilateral_termination_on_opening_message() {
        let echo = Echo::default();
        let settings = settings();
        let engine = ConversationEngine::new(&echo, &settings);
        let agents = [
            Agent::new("A", "sa"),
            Agent::new("B", "sb"),
            Agent::new("C", "sc"),
        ];
        let stop_now = |_: &Message, history: &Transcript| history.is_empty();

        let conversation = engine
            .run_multilateral(&agents, 1, 6, None, Some(&stop_now))
            .unwrap();
        assert!(conversation.terminated);
        assert_eq!(conversation.transcript.len(), 1);
        assert_eq!(conversation.transcript.messages()[0].speaker_name, "B");
        assert_eq!(echo.seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn multilateral_termination_mid_rotation() {
        let echo = Echo::default();
        let settings = settings();
        let engine = ConversationEngine::new(&echo, &settings);
        let agents = [
            Agent::new("A", "sa"),
            Agent::new("B", "sb"),
            Agent::new("C", "sc"),
        ];
        let stop_on_c = |m: &Message, _: &Transcript| m.speaker_name == "C";

        let conversation = engine
            .run_multilateral(&agents, 0, 6, None, Some(&stop_on_c))
            .unwrap();
        assert!(conversation.terminated);
        let speakers: Vec<_> = conversation
            .transcript
            .messages()
            .iter()
            .map(|m| m.speaker_name.as_str())
            .collect();
        assert_eq!(speakers, ["A", "B", "C"]);
        // nobody speaks after the stopping message
        assert_eq!(echo.seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn multilateral_custom_order() {
        let echo = Echo::default();
        let settings = settings();
        let engine = ConversationEngine::new(&echo, &settings);
        let agents = [Agent::new("A", "sa"), Agent::new("B", "sb")];
        let mut always_a = |_: &Transcript| 0;

        let conversation = engine
            .run_multilateral(&agents, 1, 2, Some(&mut always_a), None)
            .unwrap();
        let speakers: Vec<_> = conversation
            .transcript
            .messages()
            .iter()
            .map(|m| m.speaker_name.as_str())
            .collect();
        assert_eq!(speakers, ["B", "A", "A"]);
    }

    #[test]
    fn transport_errors_propagate() {
        let settings = settings();
        let engine = ConversationEngine::new(&Broken, &settings);
        let (a, b) = (Agent::new("A", "sa"), Agent::new("B", "sb"));
        assert_eq!(
            engine.run_bilateral(&a, &b, 3, None),
            Err(TransportError::Http("connection reset".into()))
        );
    }

    #[test]
    fn single_decision_sends_one_user_message() {
        let echo = Echo::default();
        let settings = settings();
        let engine = ConversationEngine::new(&echo, &settings);
        let answer = engine
            .single_decision(&Agent::new("A", "decide"), "cooperate or defect?")
            .unwrap();
        assert_eq!(answer, "decide #1");
        let seen = echo.seen.lock().unwrap();
        assert_eq!(seen[0].1, vec![ChatMessage::user("cooperate or defect?")]);
    }
}
