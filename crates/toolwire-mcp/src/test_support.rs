//! Scripted MCP peers for unit tests.

use crate::client::{McpClient, McpClientConfig};
use crate::config::ServerConfig;
use crate::connector::Connector;
use crate::protocol::McpError;
use crate::transport::Transport;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// What the scripted server does with one request
pub(crate) enum Reply {
    Result(Value),
    Error { code: i64, message: String },
    /// Fail the send itself with a transport error
    Fail(String),
    /// Never answer
    Silent,
}

pub(crate) type Responder = Arc<dyn Fn(&str, &Value) -> Reply + Send + Sync>;

/// `initialize` result of a server offering tools and resource subscriptions
pub(crate) fn initialize_result(name: &str) -> Value {
    json!({
        "protocolVersion": "2025-03-26",
        "capabilities": {"tools": {}, "resources": {"subscribe": true}},
        "serverInfo": {"name": name, "version": "1.0.0"}
    })
}

/// In-memory transport answering each request through a responder closure
pub(crate) struct ScriptedTransport {
    responder: Responder,
    outbox: VecDeque<String>,
    sent: Arc<Mutex<Vec<Value>>>,
    inject_tx: mpsc::UnboundedSender<String>,
    inject_rx: mpsc::UnboundedReceiver<String>,
    connected: Arc<AtomicBool>,
}

impl ScriptedTransport {
    pub(crate) fn new<F>(responder: F) -> Self
    where
        F: Fn(&str, &Value) -> Reply + Send + Sync + 'static,
    {
        Self::with_responder(Arc::new(responder))
    }

    pub(crate) fn with_responder(responder: Responder) -> Self {
        let (inject_tx, inject_rx) = mpsc::unbounded_channel();
        Self {
            responder,
            outbox: VecDeque::new(),
            sent: Arc::new(Mutex::new(Vec::new())),
            inject_tx,
            inject_rx,
            connected: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Every message the client sent, parsed
    pub(crate) fn sent(&self) -> Arc<Mutex<Vec<Value>>> {
        self.sent.clone()
    }

    /// Push unsolicited server messages
    pub(crate) fn injector(&self) -> mpsc::UnboundedSender<String> {
        self.inject_tx.clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(McpError::transport("transport closed"));
        }
        let value: Value = serde_json::from_str(message)?;
        self.sent.lock().unwrap().push(value.clone());

        let (Some(id), Some(method)) = (value.get("id"), value["method"].as_str()) else {
            return Ok(());
        };
        let params = value.get("params").cloned().unwrap_or(Value::Null);
        match (self.responder)(method, &params) {
            Reply::Result(result) => self.outbox.push_back(
                json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string(),
            ),
            Reply::Error { code, message } => self.outbox.push_back(
                json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
                    .to_string(),
            ),
            Reply::Fail(reason) => return Err(McpError::Transport(reason)),
            Reply::Silent => {}
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<String, McpError> {
        if let Some(message) = self.outbox.pop_front() {
            return Ok(message);
        }
        match self.inject_rx.recv().await {
            Some(message) => Ok(message),
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Responder for a server exposing the given tools; `tools/call` echoes its
/// arguments back as text
pub(crate) fn tool_server(name: &'static str, tools: Value) -> Responder {
    Arc::new(move |method, params| match method {
        "initialize" => Reply::Result(initialize_result(name)),
        "tools/list" => Reply::Result(json!({"tools": tools.clone()})),
        "tools/call" => Reply::Result(json!({
            "content": [{"type": "text", "text": params["arguments"].to_string()}]
        })),
        _ => Reply::Result(json!({})),
    })
}

/// Connector over scripted transports that counts its calls
pub(crate) struct ScriptedConnector {
    responder: Responder,
    calls: AtomicUsize,
    failures_left: AtomicUsize,
    delay: Duration,
}

impl ScriptedConnector {
    pub(crate) fn new(responder: Responder) -> Self {
        Self {
            responder,
            calls: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Refuse the first `n` connects
    pub(crate) fn failing_first(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    /// Sleep before each connect, widening race windows
    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, config: &ServerConfig) -> Result<McpClient, McpError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(McpError::transport("connection refused"));
        }
        McpClient::connect_with_config(
            ScriptedTransport::with_responder(self.responder.clone()),
            McpClientConfig::default().with_label(config.name()),
        )
        .await
    }
}
