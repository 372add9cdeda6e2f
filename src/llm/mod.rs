//! LLM provider plumbing.
//!
//! [`client::ProviderClient`] speaks both provider interaction styles: the
//! stateless completion endpoint and the stateful assistant endpoints
//! (threads, messages, runs). [`run::RunPoller`] drives a created run to a
//! terminal state.
//!
//! The types in this module are the vocabulary shared with the conversation
//! layer. Wire shapes stay private to [`wire`].

pub mod client;
pub mod run;
mod wire;

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Errors ────────────────────────────────────────────────────────────────────

/// Provider error code signalling that the transcript no longer fits the
/// model's context window.
pub const CONTEXT_LENGTH_EXCEEDED: &str = "context_length_exceeded";

/// Every way a provider interaction can fail.
///
/// Callers match on the variant; only [`ProviderError::ContextLengthExceeded`]
/// calls for a corrective action (clearing the conversation history).
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Network failure, timeout, undecodable body, or a non-2xx response
    /// without a parseable error object.
    #[error("transport failure: {0}")]
    Transport(String),

    /// The provider answered with an error object.
    #[error("provider rejected request{}: {message}", fmt_rejection(.status, .code))]
    Rejected {
        status: Option<u16>,
        code: String,
        message: String,
    },

    #[error("context length exceeded: {0}")]
    ContextLengthExceeded(String),

    #[error("no choices returned")]
    NoChoices,

    #[error("no messages returned")]
    NoMessages,

    #[error("{0}")]
    Run(#[from] RunFailure),
}

fn fmt_rejection(status: &Option<u16>, code: &str) -> String {
    match (*status, code.is_empty()) {
        (Some(s), false) => format!(" (HTTP {s}, code={code})"),
        (Some(s), true) => format!(" (HTTP {s})"),
        (None, false) => format!(" (code={code})"),
        (None, true) => String::new(),
    }
}

/// Terminal failure of an assistant run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunFailure {
    #[error("run failed: {0}")]
    Failed(String),

    #[error("run was cancelled or expired")]
    CancelledOrExpired,

    #[error("run requires action")]
    RequiresAction,

    #[error("unexpected run status: {0}")]
    Unexpected(String),

    #[error("run did not complete after {polls} polls")]
    TimedOut { polls: u32 },

    #[error("run wait aborted by shutdown")]
    Aborted,
}

// ── Conversation vocabulary ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        })
    }
}

/// One role-tagged turn. Doubles as the wire message and the history record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: content.into() }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

// ── Opaque provider identifiers ───────────────────────────────────────────────

macro_rules! provider_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

provider_id!(
    /// Provider thread bound to one conversation for the process lifetime.
    ThreadId
);
provider_id!(
    /// One execution against a thread. Polled to a terminal status, then dropped.
    RunId
);
provider_id!(MessageId);

// ── Run status ────────────────────────────────────────────────────────────────

/// Execution state of an assistant run as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    InProgress,
    Completed,
    /// Carries the provider's failure message (may be empty).
    Failed(String),
    RequiresAction,
    Cancelled,
    Cancelling,
    Expired,
    /// Any status string this client does not know about.
    Other(String),
}

impl RunStatus {
    /// Build a status from its wire name. `error_message` is only kept for
    /// `failed`.
    pub fn from_wire(status: &str, error_message: Option<String>) -> Self {
        match status {
            "queued" => RunStatus::Queued,
            "in_progress" => RunStatus::InProgress,
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed(error_message.unwrap_or_default()),
            "requires_action" => RunStatus::RequiresAction,
            "cancelled" => RunStatus::Cancelled,
            "cancelling" => RunStatus::Cancelling,
            "expired" => RunStatus::Expired,
            other => RunStatus::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Queued | RunStatus::InProgress)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunStatus::Queued => "queued",
            RunStatus::InProgress => "in_progress",
            RunStatus::Completed => "completed",
            RunStatus::Failed(_) => "failed",
            RunStatus::RequiresAction => "requires_action",
            RunStatus::Cancelled => "cancelled",
            RunStatus::Cancelling => "cancelling",
            RunStatus::Expired => "expired",
            RunStatus::Other(s) => s,
        })
    }
}

// ── Sampling parameters ───────────────────────────────────────────────────────

/// Optional sampling parameters for the completion endpoint.
/// Unset fields are left out of the request body entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f64>,
}
