//! Civica core library.
//!
//! A chat-driven civic-service assistant: citizens message in over a
//! gateway, an LLM-backed agent interprets intent, invokes structured tools
//! against the knowledge base, and replies. This crate holds the whole core:
//! the conversation session store, the bounded tool-calling loop, the tool
//! registry and handlers, the verification/escalation state machine, and the
//! daily statistics aggregator.

pub mod chat_protocol;
pub mod classifier;
pub mod config;
pub mod db;
pub mod gateway;
pub mod llm_client;
pub mod model;
pub mod orchestrator;
pub mod retrieval;
pub mod session;
pub mod tools;

pub use config::CivicaConfig;
pub use db::CivicDb;
pub use orchestrator::{Orchestrator, TurnInput};
pub use session::SessionStore;
