//! Bartender: chat-bot backend that answers conversations through either a
//! stateless completion endpoint or a stateful assistant (thread/run) API.

pub mod comms;
pub mod config;
pub mod conversation;
pub mod error;
pub mod llm;
pub mod logger;
