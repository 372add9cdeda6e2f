//! Configuration loading with env-var overrides.
//!
//! Reads the file given on the command line, else the one named by
//! `BARTENDER_CONFIG`, else `config/default.toml` relative to the current
//! working directory, then applies the
//! `BARTENDER_LOG_LEVEL` override. The provider API key comes from
//! `LLM_API_KEY` only, never from TOML.

use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::conversation::DispatcherSettings;
use crate::conversation::history::DEFAULT_TRANSCRIPT_CAP;
use crate::error::AppError;
use crate::llm::ModelParams;
use crate::llm::client::ClientSettings;
use crate::llm::run::{DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL, RunPoller};

const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Provider configuration, from `[llm]` in the TOML.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// API root, e.g. `https://api.openai.com/v1`.
    pub api_base_url: String,
    /// Completion endpoint path relative to the API root.
    pub completion_path: String,
    pub model: String,
    /// System turn prepended to every completion transcript (already trimmed).
    pub pre_prompt: Option<String>,
    /// Send the chat user id as the completion `user` field.
    pub send_user_id: bool,
    /// Set → assistant (thread/run) style; unset → completion style.
    pub assistant_id: Option<String>,
    /// Per-request HTTP timeout in seconds.
    pub timeout_seconds: u64,
    pub params: ModelParams,
    pub runs: RunsConfig,
}

/// Run polling policy, from `[llm.runs]`.
#[derive(Debug, Clone, Copy)]
pub struct RunsConfig {
    pub poll_interval: Duration,
    /// `None` polls without limit.
    pub max_polls: Option<u32>,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_name: String,
    pub log_level: String,
    pub llm: LlmConfig,
    /// API key from `LLM_API_KEY`; `None` for keyless local servers.
    pub llm_api_key: Option<String>,
    /// Per-conversation history cap in turns; `None` is unbounded.
    pub transcript_cap: Option<usize>,
    /// Whether the console channel runs.
    pub pty_enabled: bool,
}

impl Config {
    /// Connection settings for the provider client.
    pub fn client_settings(&self) -> ClientSettings {
        ClientSettings {
            api_base_url: self.llm.api_base_url.clone(),
            completion_path: self.llm.completion_path.clone(),
            model: self.llm.model.clone(),
            params: self.llm.params.clone(),
            timeout_seconds: self.llm.timeout_seconds,
            api_key: self.llm_api_key.clone(),
        }
    }

    /// Static settings for the conversation dispatcher.
    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            assistant_id: self.llm.assistant_id.clone(),
            pre_prompt: self.llm.pre_prompt.clone(),
            send_user_id: self.llm.send_user_id,
            poller: RunPoller::new(self.llm.runs.poll_interval, self.llm.runs.max_polls),
            transcript_cap: self.transcript_cap,
        }
    }
}

// ── Raw TOML shape ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct RawConfig {
    supervisor: RawSupervisor,
    #[serde(default)]
    llm: RawLlm,
    #[serde(default)]
    memory: RawMemory,
    #[serde(default)]
    comms: RawComms,
}

#[derive(Deserialize)]
struct RawSupervisor {
    #[serde(default = "default_bot_name")]
    bot_name: String,
    #[serde(default = "default_log_level")]
    log_level: String,
}

#[derive(Deserialize)]
struct RawLlm {
    #[serde(default = "default_api_base_url")]
    api_base_url: String,
    #[serde(default = "default_completion_path")]
    completion_path: String,
    #[serde(default = "default_model")]
    model: String,
    #[serde(default)]
    pre_prompt: String,
    #[serde(default)]
    send_user_id: bool,
    #[serde(default)]
    assistant_id: String,
    #[serde(default = "default_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default)]
    params: ModelParams,
    #[serde(default)]
    runs: RawRuns,
}

impl Default for RawLlm {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            completion_path: default_completion_path(),
            model: default_model(),
            pre_prompt: String::new(),
            send_user_id: false,
            assistant_id: String::new(),
            timeout_seconds: default_timeout_seconds(),
            params: ModelParams::default(),
            runs: RawRuns::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawRuns {
    #[serde(default = "default_poll_interval_ms")]
    poll_interval_ms: u64,
    /// `0` disables the limit.
    #[serde(default = "default_max_polls")]
    max_polls: u32,
}

impl Default for RawRuns {
    fn default() -> Self {
        Self { poll_interval_ms: default_poll_interval_ms(), max_polls: default_max_polls() }
    }
}

#[derive(Deserialize, Default)]
struct RawMemory {
    #[serde(default)]
    history: RawHistory,
}

#[derive(Deserialize)]
struct RawHistory {
    /// `0` disables the cap.
    #[serde(default = "default_transcript_cap")]
    transcript_cap: usize,
}

impl Default for RawHistory {
    fn default() -> Self {
        Self { transcript_cap: default_transcript_cap() }
    }
}

#[derive(Deserialize, Default)]
struct RawComms {
    #[serde(default)]
    pty: RawPty,
}

#[derive(Deserialize)]
struct RawPty {
    #[serde(default = "default_true")]
    enabled: bool,
}

impl Default for RawPty {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_bot_name() -> String { "bartender".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_api_base_url() -> String { "https://api.openai.com/v1".to_string() }
fn default_completion_path() -> String { "/chat/completions".to_string() }
fn default_model() -> String { "gpt-4o-mini".to_string() }
fn default_timeout_seconds() -> u64 { 60 }
fn default_poll_interval_ms() -> u64 { DEFAULT_POLL_INTERVAL.as_millis() as u64 }
fn default_max_polls() -> u32 { DEFAULT_MAX_POLLS }
fn default_transcript_cap() -> usize { DEFAULT_TRANSCRIPT_CAP }
fn default_true() -> bool { true }

/// Load config from `config_path`, `BARTENDER_CONFIG` or `config/default.toml`
/// (first one set wins), then apply env-var overrides.
pub fn load(config_path: Option<&str>) -> Result<Config, AppError> {
    let path = match config_path {
        Some(p) => expand_home(p),
        None => env::var("BARTENDER_CONFIG")
            .map(|p| expand_home(&p))
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH)),
    };
    let log_level_override = env::var("BARTENDER_LOG_LEVEL").ok();
    let api_key = env::var("LLM_API_KEY").ok().filter(|k| !k.is_empty());
    load_from(&path, log_level_override.as_deref(), api_key)
}

/// Loader with an explicit path and overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    log_level_override: Option<&str>,
    api_key: Option<String>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    let s = parsed.supervisor;
    let llm = parsed.llm;

    if llm.runs.poll_interval_ms == 0 {
        return Err(AppError::Config("llm.runs.poll_interval_ms must be greater than 0".into()));
    }

    Ok(Config {
        bot_name: s.bot_name,
        log_level: log_level_override.unwrap_or(&s.log_level).to_string(),
        llm: LlmConfig {
            api_base_url: llm.api_base_url,
            completion_path: llm.completion_path,
            model: llm.model,
            pre_prompt: non_empty(llm.pre_prompt.trim()),
            send_user_id: llm.send_user_id,
            assistant_id: non_empty(llm.assistant_id.trim()),
            timeout_seconds: llm.timeout_seconds,
            params: llm.params,
            runs: RunsConfig {
                poll_interval: Duration::from_millis(llm.runs.poll_interval_ms),
                max_polls: (llm.runs.max_polls > 0).then_some(llm.runs.max_polls),
            },
        },
        llm_api_key: api_key,
        transcript_cap: (parsed.memory.history.transcript_cap > 0)
            .then_some(parsed.memory.history.transcript_cap),
        pty_enabled: parsed.comms.pty.enabled,
    })
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests: unreachable provider, no API key.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            bot_name: "test".into(),
            log_level: "info".into(),
            llm: LlmConfig {
                api_base_url: "http://localhost:0/v1".into(),
                completion_path: default_completion_path(),
                model: "test-model".into(),
                pre_prompt: None,
                send_user_id: false,
                assistant_id: None,
                timeout_seconds: 1,
                params: ModelParams::default(),
                runs: RunsConfig { poll_interval: Duration::from_millis(10), max_polls: Some(5) },
            },
            llm_api_key: None,
            transcript_cap: Some(DEFAULT_TRANSCRIPT_CAP),
            pty_enabled: false,
        }
    }
}
