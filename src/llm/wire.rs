//! Private wire shapes for the provider's JSON API.
//!
//! Response types default every field so that an error-only body still
//! decodes; the embedded `error` object is then inspected by the client.

use serde::{Deserialize, Serialize};

use super::{ConversationTurn, ModelParams, Role};

// ── Errors ────────────────────────────────────────────────────────────────────

/// `{message, type, param, code}` error object used by OpenAI and compatible APIs.
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct ErrorObject {
    #[serde(default)]
    pub message: String,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub param: Option<serde_json::Value>,
    #[serde(default)]
    pub code: Option<serde_json::Value>,
}

impl ErrorObject {
    /// The code as a plain string; numeric codes are rendered, `null` is empty.
    pub fn code_str(&self) -> String {
        match &self.code {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    pub fn is_set(&self) -> bool {
        !self.message.is_empty() || !self.code_str().is_empty()
    }
}

/// Body of a non-2xx response.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
    pub error: ErrorObject,
}

/// Response bodies that may carry an inline error object.
pub(crate) trait ErrorBearing {
    fn error(&self) -> Option<&ErrorObject>;
}

macro_rules! error_bearing {
    ($($ty:ty),* $(,)?) => {
        $(impl ErrorBearing for $ty {
            fn error(&self) -> Option<&ErrorObject> {
                self.error.as_ref().filter(|e| e.is_set())
            }
        })*
    };
}

error_bearing!(
    CompletionResponse,
    ThreadResponse,
    MessageResponse,
    RunResponse,
    MessageListResponse,
    AssistantResponse,
);

// ── Completion ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub(crate) struct CompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ConversationTurn],
    #[serde(flatten)]
    pub params: &'a ModelParams,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<&'a str>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct CompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Option<Usage>,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Choice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub finish_reason: Option<String>,
    pub message: ChoiceMessage,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct ChoiceMessage {
    #[serde(default)]
    pub role: Option<Role>,
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

// ── Threads, messages, runs ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ThreadResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

#[derive(Debug, Serialize)]
pub(crate) struct NewMessage<'a> {
    pub role: Role,
    pub content: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MessageResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RunRequest<'a> {
    pub assistant_id: &'a str,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct RunResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub status: String,
    /// Set by the provider on runs that ended in `failed`.
    #[serde(default)]
    pub last_error: Option<ErrorObject>,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

impl RunResponse {
    /// Failure message of a `failed` run, from `last_error`.
    pub fn failure_message(&self) -> Option<String> {
        self.last_error
            .as_ref()
            .filter(|e| !e.message.is_empty())
            .map(|e| e.message.clone())
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct MessageListResponse {
    #[serde(default)]
    pub data: Vec<ThreadMessage>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ThreadMessage {
    #[serde(default)]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub content: Vec<MessageContent>,
}

impl ThreadMessage {
    /// Value of the first `text` block, or empty when the message has none.
    pub fn first_text(&self) -> String {
        self.content
            .iter()
            .find(|c| c.kind == "text")
            .and_then(|c| c.text.as_ref())
            .map(|t| t.value.clone())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageContent {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBlock>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TextBlock {
    pub value: String,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct AssistantResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub error: Option<ErrorObject>,
}
