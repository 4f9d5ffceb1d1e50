#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use ado_anchors::client::{Method, Transport, TransportError, WorkItemClient};
use ado_anchors::config::Settings;
use ado_anchors::render::{Notifier, RenderContext};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

enum Reply {
    Json(Value),
    Status(u16),
}

/// Transport double answering by path substring. The most recently added
/// route wins. With a gate, every request waits for one `notify_one`.
#[derive(Default)]
pub struct MockTransport {
    calls: Mutex<Vec<Call>>,
    routes: Mutex<Vec<(String, Reply)>>,
    gate: Option<Arc<Notify>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(mut self, gate: Arc<Notify>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn route(&self, pattern: &str, response: Value) {
        self.routes
            .lock()
            .unwrap()
            .insert(0, (pattern.to_string(), Reply::Json(response)));
    }

    pub fn fail(&self, pattern: &str, status: u16) {
        self.routes
            .lock()
            .unwrap()
            .insert(0, (pattern.to_string(), Reply::Status(status)));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, pattern: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.path.contains(pattern))
            .count()
    }

    /// Yield until `n` requests have been issued.
    pub async fn wait_for_calls(&self, n: usize) {
        while self.calls.lock().unwrap().len() < n {
            tokio::task::yield_now().await;
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<Value, TransportError> {
        self.calls.lock().unwrap().push(Call {
            method,
            path: path.to_string(),
            body,
        });
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let routes = self.routes.lock().unwrap();
        match routes.iter().find(|(pattern, _)| path.contains(pattern.as_str())) {
            Some((_, Reply::Json(value))) => Ok(value.clone()),
            Some((_, Reply::Status(404))) => Err(TransportError::NotFound(path.to_string())),
            Some((_, Reply::Status(status))) => Err(TransportError::Status {
                status: *status,
                body: "boom".to_string(),
            }),
            None => Err(TransportError::NotFound(path.to_string())),
        }
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    pub notices: Mutex<Vec<String>>,
}

impl Notifier for RecordingNotifier {
    fn notice(&self, message: &str) {
        self.notices.lock().unwrap().push(message.to_string());
    }
}

pub fn settings() -> Settings {
    Settings {
        organization_url: Some("https://dev.azure.com/contoso".to_string()),
        project_name: Some("Fabrikam".to_string()),
        personal_access_token: Some("secret-pat".to_string()),
        ..Settings::default()
    }
}

pub fn client(transport: &Arc<MockTransport>) -> WorkItemClient {
    client_with(transport, settings())
}

pub fn client_with(transport: &Arc<MockTransport>, settings: Settings) -> WorkItemClient {
    WorkItemClient::new(transport.clone(), Arc::new(settings))
}

pub fn context(transport: &Arc<MockTransport>) -> Arc<RenderContext> {
    RenderContext::new(client(transport), Arc::new(RecordingNotifier::default()))
}

pub fn work_item(id: i64, title: &str, state: &str) -> Value {
    json!({
        "id": id,
        "rev": 1,
        "url": format!("https://dev.azure.com/contoso/_apis/wit/workItems/{}", id),
        "fields": {
            "System.Title": title,
            "System.State": state,
            "System.WorkItemType": "Epic",
            "System.Description": "<div>Ship it</div>",
            "System.AssignedTo": { "displayName": "Grace Hopper", "uniqueName": "grace@contoso.com" }
        }
    })
}

pub fn wiql(ids: &[i64]) -> Value {
    let items: Vec<Value> = ids.iter().map(|id| json!({ "id": id })).collect();
    json!({ "queryType": "flat", "workItems": items })
}

pub fn batch(items: Vec<Value>) -> Value {
    json!({ "count": items.len(), "value": items })
}
