use crate::session::{SessionManager, basic_auth_header};
use crate::store::MemoryStore;
use async_trait::async_trait;
use chatcore::events::CoreEventBus;
use chatcore::net::{HttpClient, HttpRequest, HttpResponse};
use chatcore::types::User;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
enum Scripted {
    Reply { status: u16, body: Value },
    Fail(String),
}

/// Scripted HTTP client. Replies are keyed by GraphQL operation name, or by
/// the last URL path segment for non-GraphQL requests. Queued replies are
/// consumed in order; the last one keeps answering.
#[derive(Default)]
pub struct MockHttpClient {
    replies: Mutex<HashMap<String, VecDeque<Scripted>>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, key: &str, reply: Scripted) {
        self.replies
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .push_back(reply);
    }

    pub fn respond(&self, key: &str, body: Value) {
        self.respond_status(key, 200, body);
    }

    pub fn respond_status(&self, key: &str, status: u16, body: Value) {
        self.push(key, Scripted::Reply { status, body });
    }

    pub fn fail(&self, key: &str, message: &str) {
        self.push(key, Scripted::Fail(message.to_string()));
    }

    /// Requests for `key` wait until the returned gate is notified.
    pub fn gate(&self, key: &str) -> Arc<Notify> {
        self.gates
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Operation names of the GraphQL requests sent so far.
    pub fn operations(&self) -> Vec<String> {
        self.requests().iter().filter_map(operation_name).collect()
    }

    pub fn variables(&self, operation: &str) -> Option<Value> {
        self.requests()
            .iter()
            .rev()
            .filter(|r| operation_name(r).as_deref() == Some(operation))
            .find_map(|r| body_json(r).map(|b| b["variables"].clone()))
    }
}

fn body_json(request: &HttpRequest) -> Option<Value> {
    serde_json::from_slice(request.body.as_deref()?).ok()
}

fn operation_name(request: &HttpRequest) -> Option<String> {
    body_json(request)?
        .get("operationName")?
        .as_str()
        .map(str::to_string)
}

fn request_key(request: &HttpRequest) -> String {
    operation_name(request).unwrap_or_else(|| {
        request
            .url
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string()
    })
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn execute(&self, request: HttpRequest) -> anyhow::Result<HttpResponse> {
        let key = request_key(&request);
        self.requests.lock().unwrap().push(request);

        let gate = self.gates.lock().unwrap().get(&key).cloned();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            let queue = replies
                .get_mut(&key)
                .ok_or_else(|| anyhow::anyhow!("no scripted reply for {key}"))?;
            if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            }
        };

        match reply {
            Some(Scripted::Reply { status, body }) => Ok(HttpResponse {
                status_code: status,
                body: serde_json::to_vec(&body)?,
            }),
            Some(Scripted::Fail(message)) => Err(anyhow::anyhow!(message)),
            None => Err(anyhow::anyhow!("no scripted reply for {key}")),
        }
    }
}

pub async fn logged_in_session(user_id: &str) -> Arc<SessionManager> {
    let session = SessionManager::load(Arc::new(MemoryStore::new()), CoreEventBus::new())
        .await
        .unwrap();
    session
        .store(
            basic_auth_header(user_id, "pass"),
            User::new(user_id).with_name(format!("User {user_id}")),
        )
        .await
        .unwrap();
    Arc::new(session)
}

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}
