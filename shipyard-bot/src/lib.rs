//! shipyard-bot: a chat front end for the shipyard build engine.
//!
//! Messages are classified by an LLM into build, version-check or chat
//! intents; builds run one at a time through [`shipyard_engine::Orchestrator`].

pub mod bot;
pub mod config;
pub mod intent;
pub mod llm;
pub mod output;
