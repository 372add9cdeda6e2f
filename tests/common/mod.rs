//! In-process mock of the provider API, served by axum on `127.0.0.1:0`.
//!
//! Every endpoint counts its hits and records what it received; replies are
//! scripted per test through [`MockProvider`].

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};

use bartender::conversation::{Dispatcher, DispatcherSettings};
use bartender::llm::ModelParams;
use bartender::llm::client::{ClientSettings, ProviderClient};
use bartender::llm::run::RunPoller;
use tokio_util::sync::CancellationToken;

pub const API_KEY: &str = "sk-test";
pub const ASSISTANT_ID: &str = "asst_1";

type Reply = (StatusCode, Value);

#[derive(Default)]
pub struct Counters {
    pub completions: AtomicUsize,
    pub threads: AtomicUsize,
    pub messages_posted: AtomicUsize,
    pub runs_created: AtomicUsize,
    pub run_polls: AtomicUsize,
    pub messages_listed: AtomicUsize,
    pub assistants: AtomicUsize,
}

#[derive(Default)]
pub struct MockProvider {
    pub counters: Counters,
    /// Bodies received on the completion endpoint, in order.
    pub completion_bodies: Mutex<Vec<Value>>,
    /// Bodies received on `POST threads/{id}/messages`.
    pub posted_messages: Mutex<Vec<Value>>,
    /// Headers of every request, in order.
    pub headers: Mutex<Vec<HeaderMap>>,
    completion_replies: Mutex<VecDeque<Reply>>,
    /// Status values handed out by run creation and subsequent polls.
    run_statuses: Mutex<VecDeque<String>>,
    /// Newest-first message texts returned by the message list.
    thread_messages: Mutex<Vec<String>>,
    /// Artificial latency of thread creation.
    thread_delay: Mutex<Duration>,
}

impl MockProvider {
    pub fn reply_completion(&self, text: &str) {
        self.completion_replies.lock().unwrap().push_back((
            StatusCode::OK,
            json!({
                "id": "chatcmpl-1",
                "model": "test-model",
                "choices": [{
                    "index": 0,
                    "finish_reason": "stop",
                    "message": { "role": "assistant", "content": text }
                }],
                "usage": { "prompt_tokens": 10, "completion_tokens": 2, "total_tokens": 12 }
            }),
        ));
    }

    pub fn reply_completion_raw(&self, status: StatusCode, body: Value) {
        self.completion_replies.lock().unwrap().push_back((status, body));
    }

    pub fn script_run(&self, statuses: &[&str]) {
        let mut q = self.run_statuses.lock().unwrap();
        q.extend(statuses.iter().map(|s| s.to_string()));
    }

    pub fn set_thread_messages(&self, newest_first: &[&str]) {
        *self.thread_messages.lock().unwrap() = newest_first.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_thread_delay(&self, delay: Duration) {
        *self.thread_delay.lock().unwrap() = delay;
    }

    pub fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn record(&self, headers: HeaderMap) {
        self.headers.lock().unwrap().push(headers);
    }

    fn next_run_status(&self) -> String {
        let mut q = self.run_statuses.lock().unwrap();
        // The last scripted status sticks once the script is exhausted.
        if q.len() > 1 {
            q.pop_front().unwrap_or_default()
        } else {
            q.front().cloned().unwrap_or_else(|| "completed".to_string())
        }
    }
}

async fn completions(
    State(mock): State<Arc<MockProvider>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    mock.counters.completions.fetch_add(1, Ordering::SeqCst);
    mock.record(headers);
    mock.completion_bodies.lock().unwrap().push(body);
    let (status, reply) = mock
        .completion_replies
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or((StatusCode::OK, json!({ "choices": [] })));
    (status, Json(reply))
}

async fn create_thread(State(mock): State<Arc<MockProvider>>, headers: HeaderMap) -> Json<Value> {
    let n = mock.counters.threads.fetch_add(1, Ordering::SeqCst) + 1;
    mock.record(headers);
    let delay = *mock.thread_delay.lock().unwrap();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    Json(json!({ "id": format!("thread_{n}"), "object": "thread" }))
}

async fn post_message(
    State(mock): State<Arc<MockProvider>>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let n = mock.counters.messages_posted.fetch_add(1, Ordering::SeqCst) + 1;
    mock.record(headers);
    mock.posted_messages
        .lock()
        .unwrap()
        .push(json!({ "thread_id": thread_id, "body": body }));
    Json(json!({ "id": format!("msg_{n}"), "object": "thread.message" }))
}

async fn list_messages(
    State(mock): State<Arc<MockProvider>>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
) -> Json<Value> {
    mock.counters.messages_listed.fetch_add(1, Ordering::SeqCst);
    mock.record(headers);
    let data: Vec<Value> = mock
        .thread_messages
        .lock()
        .unwrap()
        .iter()
        .enumerate()
        .map(|(i, text)| {
            json!({
                "id": format!("msg_r{i}"),
                "thread_id": thread_id,
                "role": "assistant",
                "content": [{ "type": "text", "text": { "value": text, "annotations": [] } }]
            })
        })
        .collect();
    Json(json!({ "object": "list", "data": data, "has_more": false }))
}

async fn create_run(
    State(mock): State<Arc<MockProvider>>,
    Path(thread_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let n = mock.counters.runs_created.fetch_add(1, Ordering::SeqCst) + 1;
    mock.record(headers);
    if body["assistant_id"] != ASSISTANT_ID {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": {
                "message": "No assistant found",
                "type": "invalid_request_error",
                "code": null
            }})),
        );
    }
    let status = mock.next_run_status();
    (StatusCode::OK, Json(run_body(&format!("run_{n}"), &thread_id, &status)))
}

async fn get_run(
    State(mock): State<Arc<MockProvider>>,
    Path((thread_id, run_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Json<Value> {
    mock.counters.run_polls.fetch_add(1, Ordering::SeqCst);
    mock.record(headers);
    let status = mock.next_run_status();
    Json(run_body(&run_id, &thread_id, &status))
}

fn run_body(run_id: &str, thread_id: &str, status: &str) -> Value {
    let last_error = if status == "failed" {
        json!({ "code": "server_error", "message": "run exploded" })
    } else {
        Value::Null
    };
    json!({ "id": run_id, "thread_id": thread_id, "status": status, "last_error": last_error })
}

async fn get_assistant(
    State(mock): State<Arc<MockProvider>>,
    Path(assistant_id): Path<String>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    mock.counters.assistants.fetch_add(1, Ordering::SeqCst);
    mock.record(headers);
    if assistant_id == ASSISTANT_ID {
        (
            StatusCode::OK,
            Json(json!({ "id": ASSISTANT_ID, "name": "Barkeep", "model": "gpt-4o" })),
        )
    } else {
        (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": {
                "message": format!("No assistant found with id '{assistant_id}'."),
                "type": "invalid_request_error",
                "param": null,
                "code": null
            }})),
        )
    }
}

/// Serve the mock and return it together with its API root (`http://…/v1`).
pub async fn start() -> (Arc<MockProvider>, String) {
    let mock = Arc::new(MockProvider::default());
    let app = Router::new()
        .route("/v1/chat/completions", post(completions))
        .route("/v1/threads", post(create_thread))
        .route("/v1/threads/{thread_id}/messages", post(post_message).get(list_messages))
        .route("/v1/threads/{thread_id}/runs", post(create_run))
        .route("/v1/threads/{thread_id}/runs/{run_id}", get(get_run))
        .route("/v1/assistants/{assistant_id}", get(get_assistant))
        .with_state(mock.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (mock, format!("http://{addr}/v1"))
}

pub fn client(base_url: &str) -> ProviderClient {
    ProviderClient::new(ClientSettings {
        api_base_url: base_url.to_string(),
        completion_path: "/chat/completions".into(),
        model: "test-model".into(),
        params: ModelParams { temperature: Some(0.5), ..Default::default() },
        timeout_seconds: 5,
        api_key: Some(API_KEY.into()),
    })
    .unwrap()
}

pub fn fast_poller() -> RunPoller {
    RunPoller::new(Duration::from_millis(10), Some(20))
}

pub fn stateless_dispatcher(base_url: &str, pre_prompt: Option<&str>) -> Dispatcher {
    let settings = DispatcherSettings {
        pre_prompt: pre_prompt.map(str::to_string),
        transcript_cap: Some(50),
        ..Default::default()
    };
    Dispatcher::new(client(base_url), settings, CancellationToken::new())
}

pub fn stateful_dispatcher(base_url: &str, shutdown: CancellationToken) -> Dispatcher {
    let settings = DispatcherSettings {
        assistant_id: Some(ASSISTANT_ID.into()),
        poller: fast_poller(),
        ..Default::default()
    };
    Dispatcher::new(client(base_url), settings, shutdown)
}
