//! HTTP client for the provider's completion and assistant endpoints.
//!
//! One round-trip per call, no retries, no business logic. Every request
//! carries the bearer token (when configured) and a JSON content type;
//! assistant endpoints also carry the API-version header. Failures are
//! mapped into [`ProviderError`] here so callers match on variants rather
//! than on error strings.

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, Method, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, error, trace};

use super::wire::{
    AssistantResponse, CompletionRequest, CompletionResponse, ErrorBearing, ErrorEnvelope,
    ErrorObject, MessageListResponse, MessageResponse, NewMessage, RunRequest, RunResponse,
    ThreadResponse,
};
use super::{
    CONTEXT_LENGTH_EXCEEDED, ConversationTurn, MessageId, ModelParams, ProviderError, RunId,
    RunStatus, ThreadId,
};

/// Header selecting the assistant API version.
const BETA_HEADER: &str = "OpenAI-Beta";
const BETA_VALUE: &str = "assistants=v2";

/// Connection settings for [`ProviderClient::new`].
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// API root, e.g. `https://api.openai.com/v1`.
    pub api_base_url: String,
    /// Completion path relative to the root, e.g. `/chat/completions`.
    pub completion_path: String,
    pub model: String,
    pub params: ModelParams,
    pub timeout_seconds: u64,
    /// `None` for keyless local servers.
    pub api_key: Option<String>,
}

/// Identity of a configured assistant, as reported by the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssistantInfo {
    pub id: String,
    pub name: Option<String>,
    pub model: String,
}

/// Authenticated JSON client for one provider account.
///
/// Cheap to clone: `reqwest::Client` is an `Arc` internally.
#[derive(Debug, Clone)]
pub struct ProviderClient {
    client: Client,
    api_base_url: String,
    completion_path: String,
    model: String,
    params: ModelParams,
    api_key: Option<String>,
}

impl ProviderClient {
    pub fn new(settings: ClientSettings) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds))
            .build()
            .map_err(|e| ProviderError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base_url: settings.api_base_url,
            completion_path: settings.completion_path,
            model: settings.model,
            params: settings.params,
            api_key: settings.api_key,
        })
    }

    // ── Stateless style ───────────────────────────────────────────────────

    /// Send the whole `transcript` and return the first choice's content.
    ///
    /// `user_tag` is forwarded as the request's `user` field when present.
    pub async fn completion(
        &self,
        transcript: &[ConversationTurn],
        user_tag: Option<&str>,
    ) -> Result<String, ProviderError> {
        let url = self.endpoint(&self.completion_path);
        let payload = CompletionRequest {
            model: &self.model,
            messages: transcript,
            params: &self.params,
            user: user_tag.filter(|u| !u.is_empty()),
        };

        debug!(model = %self.model, turns = transcript.len(), "sending completion request");
        trace_payload("completion request", &payload);

        let req = self.request(Method::POST, &url, false).json(&payload);
        let parsed: CompletionResponse = self.send(req, &url).await?;

        if let Some(usage) = &parsed.usage {
            debug!(
                choices = parsed.choices.len(),
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "received completion"
            );
        }
        trace_payload("completion response", &parsed);

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.unwrap_or_default())
            .ok_or(ProviderError::NoChoices)
    }

    // ── Stateful style ────────────────────────────────────────────────────

    pub async fn create_thread(&self) -> Result<ThreadId, ProviderError> {
        let url = self.endpoint("threads");
        let req = self.request(Method::POST, &url, true);
        let parsed: ThreadResponse = self.send(req, &url).await?;
        debug!(thread_id = %parsed.id, "thread created");
        Ok(ThreadId::new(parsed.id))
    }

    pub async fn add_message(
        &self,
        thread: &ThreadId,
        turn: &ConversationTurn,
    ) -> Result<MessageId, ProviderError> {
        let url = self.endpoint(&format!("threads/{thread}/messages"));
        let body = NewMessage { role: turn.role, content: &turn.content };
        let req = self.request(Method::POST, &url, true).json(&body);
        let parsed: MessageResponse = self.send(req, &url).await?;
        debug!(%thread, message_id = %parsed.id, "message added to thread");
        Ok(MessageId::new(parsed.id))
    }

    /// Start a run of `assistant_id` on `thread`. Returns the run handle and
    /// the status the provider reported at creation.
    pub async fn create_run(
        &self,
        thread: &ThreadId,
        assistant_id: &str,
    ) -> Result<(RunId, RunStatus), ProviderError> {
        let url = self.endpoint(&format!("threads/{thread}/runs"));
        let body = RunRequest { assistant_id };
        let req = self.request(Method::POST, &url, true).json(&body);
        let parsed: RunResponse = self.send(req, &url).await?;
        let status = RunStatus::from_wire(&parsed.status, parsed.failure_message());
        debug!(%thread, run_id = %parsed.id, %status, "run created");
        Ok((RunId::new(parsed.id), status))
    }

    pub async fn fetch_run_status(
        &self,
        thread: &ThreadId,
        run: &RunId,
    ) -> Result<RunStatus, ProviderError> {
        let url = self.endpoint(&format!("threads/{thread}/runs/{run}"));
        let req = self.request(Method::GET, &url, true);
        let parsed: RunResponse = self.send(req, &url).await?;
        let status = RunStatus::from_wire(&parsed.status, parsed.failure_message());
        trace!(%thread, %run, %status, "run status");
        Ok(status)
    }

    /// Messages of `thread` in provider order; the first entry is treated as
    /// the most recent reply.
    pub async fn fetch_messages(
        &self,
        thread: &ThreadId,
    ) -> Result<Vec<ConversationTurn>, ProviderError> {
        let url = self.endpoint(&format!("threads/{thread}/messages"));
        let req = self.request(Method::GET, &url, true);
        let parsed: MessageListResponse = self.send(req, &url).await?;
        debug!(%thread, count = parsed.data.len(), has_more = parsed.has_more, "thread messages fetched");
        Ok(parsed
            .data
            .iter()
            .map(|m| ConversationTurn::new(m.role, m.first_text()))
            .collect())
    }

    /// Look up an assistant by id. Used at startup to validate configuration.
    pub async fn fetch_assistant(&self, assistant_id: &str) -> Result<AssistantInfo, ProviderError> {
        let url = self.endpoint(&format!("assistants/{assistant_id}"));
        let req = self.request(Method::GET, &url, true);
        let parsed: AssistantResponse = self.send(req, &url).await?;
        Ok(AssistantInfo { id: parsed.id, name: parsed.name, model: parsed.model })
    }

    // ── Plumbing ──────────────────────────────────────────────────────────

    /// Join `path` onto the API root with exactly one `/` between them.
    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.api_base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, url: &str, assistants: bool) -> RequestBuilder {
        let mut req = self
            .client
            .request(method, url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json; charset=utf-8"));
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        if assistants {
            req = req.header(BETA_HEADER, BETA_VALUE);
        }
        req
    }

    /// Perform the request and decode the body, classifying every failure.
    async fn send<T>(&self, req: RequestBuilder, url: &str) -> Result<T, ProviderError>
    where
        T: DeserializeOwned + ErrorBearing,
    {
        let response = req.send().await.map_err(|e| {
            error!(%url, error = %e, timeout = e.is_timeout(), "provider request failed (transport)");
            ProviderError::Transport(e.to_string())
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            error!(%url, error = %e, "failed to read provider response body");
            ProviderError::Transport(format!("cannot read response body: {e}"))
        })?;

        if !status.is_success() {
            let err = match serde_json::from_str::<ErrorEnvelope>(&body) {
                Ok(env) if env.error.is_set() => classify(&env.error, Some(status.as_u16())),
                _ => ProviderError::Transport(format!("HTTP {status}: {body}")),
            };
            error!(%url, %status, error = %err, "provider returned HTTP error");
            return Err(err);
        }

        let parsed: T = serde_json::from_str(&body).map_err(|e| {
            error!(%url, error = %e, "failed to deserialize provider response");
            ProviderError::Transport(format!("cannot parse response body: {e}"))
        })?;

        if let Some(err) = parsed.error() {
            let err = classify(err, Some(status.as_u16()));
            error!(%url, error = %err, "provider response carried an error");
            return Err(err);
        }

        Ok(parsed)
    }
}

fn classify(err: &ErrorObject, status: Option<u16>) -> ProviderError {
    let code = err.code_str();
    if code == CONTEXT_LENGTH_EXCEEDED {
        ProviderError::ContextLengthExceeded(err.message.clone())
    } else {
        ProviderError::Rejected { status, code, message: err.message.clone() }
    }
}

fn trace_payload<T: Serialize>(label: &str, payload: &T) {
    if tracing::enabled!(tracing::Level::TRACE) {
        let json = serde_json::to_string_pretty(payload)
            .unwrap_or_else(|e| format!("<serialization failed: {e}>"));
        trace!(payload = %json, "{label}");
    }
}
