//! Deferred tools
//!
//! A [`LazyTool`] is known by name and description up front and only contacts
//! its server on first use. It walks
//! `Unresolved -> Connecting -> SchemaDiscovering -> Ready`; a failed connect
//! falls back to `Unresolved` so the next use tries again, while a failed
//! discovery still reaches `Ready` with the empty object schema.

use crate::cache::ConnectionCache;
use tokio_util::sync::CancellationToken;
use crate::config::ServerConfig;
use crate::protocol::McpError;
use crate::retry::{retry_with_policy, RetryPolicy, RetryingClient};
use crate::tool_adapter::{invoke, schema_or_empty};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use toolwire_core::tools::{empty_object_schema, Tool};
use tracing::{debug, instrument, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LazyState {
    Unresolved = 0,
    Connecting = 1,
    SchemaDiscovering = 2,
    Ready = 3,
}

impl LazyState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => LazyState::Connecting,
            2 => LazyState::SchemaDiscovering,
            3 => LazyState::Ready,
            _ => LazyState::Unresolved,
        }
    }
}

#[derive(Default)]
struct Resolved {
    client: Option<RetryingClient>,
    schema: Option<Value>,
}

pub struct LazyTool {
    cache: Arc<ConnectionCache>,
    config: ServerConfig,
    tool_name: String,
    description: String,
    policy: RetryPolicy,
    cancel: CancellationToken,
    state: AtomicU8,
    resolved: Mutex<Resolved>,
}

impl LazyTool {
    pub fn new(
        cache: Arc<ConnectionCache>,
        config: ServerConfig,
        tool_name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            cache,
            config,
            tool_name: tool_name.into(),
            description: description.into(),
            policy: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            state: AtomicU8::new(LazyState::Unresolved as u8),
            resolved: Mutex::new(Resolved::default()),
        }
    }

    /// Policy for connecting and for each tool call
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn state(&self) -> LazyState {
        LazyState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn server(&self) -> &ServerConfig {
        &self.config
    }

    fn set_state(&self, state: LazyState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    /// Connect and discover the schema once; later callers reuse both
    async fn resolve(&self) -> Result<(RetryingClient, Value), McpError> {
        let mut resolved = self.resolved.lock().await;

        let client = match &resolved.client {
            Some(client) => client.clone(),
            None => {
                self.set_state(LazyState::Connecting);
                let label = format!("connect to '{}'", self.config.name());
                let connected = retry_with_policy(&self.policy, &self.cancel, &label, || {
                    self.cache.get_or_create(&self.config)
                })
                .await;
                match connected {
                    Ok(inner) => {
                        let client = RetryingClient::new(inner, self.policy.clone())
                            .with_cancel(self.cancel.clone());
                        resolved.client = Some(client.clone());
                        client
                    }
                    Err(e) => {
                        self.set_state(LazyState::Unresolved);
                        return Err(e);
                    }
                }
            }
        };

        if let Some(schema) = &resolved.schema {
            return Ok((client, schema.clone()));
        }

        self.set_state(LazyState::SchemaDiscovering);
        let schema = match client.list_tools().await {
            Ok(tools) => match tools.into_iter().find(|t| t.name == self.tool_name) {
                Some(tool) => schema_or_empty(&tool.input_schema),
                None => {
                    warn!(
                        server = %self.config.name(),
                        tool_name = %self.tool_name,
                        "Server does not list this tool; using empty schema"
                    );
                    empty_object_schema()
                }
            },
            Err(e) if e.is_cancelled() => {
                // Nothing learned; the next use discovers again
                return Err(e);
            }
            Err(e) => {
                let err = McpError::Schema(e.to_string());
                warn!(
                    server = %self.config.name(),
                    tool_name = %self.tool_name,
                    error = %err,
                    "Using empty schema"
                );
                empty_object_schema()
            }
        };

        resolved.schema = Some(schema.clone());
        self.set_state(LazyState::Ready);
        debug!(server = %self.config.name(), tool_name = %self.tool_name, "Lazy tool ready");
        Ok((client, schema))
    }
}

#[async_trait]
impl Tool for LazyTool {
    fn name(&self) -> &str {
        &self.tool_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn parameters(&self) -> Value {
        match self.resolve().await {
            Ok((_, schema)) => schema,
            Err(e) => {
                warn!(
                    server = %self.config.name(),
                    tool_name = %self.tool_name,
                    error = %e,
                    "Could not resolve tool schema"
                );
                empty_object_schema()
            }
        }
    }

    #[instrument(skip(self, input), fields(server = %self.config.name(), tool_name = %self.tool_name))]
    async fn run(&self, input: &str) -> anyhow::Result<String> {
        let (client, _) = self.resolve().await?;
        Ok(invoke(&client, &self.tool_name, input).await?)
    }
}

impl std::fmt::Debug for LazyTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyTool")
            .field("server", &self.config.name())
            .field("tool_name", &self.tool_name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::TransportConnector;
    use crate::readiness::ReadinessProber;
    use crate::test_support::{initialize_result, tool_server, Reply, ScriptedConnector};
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn search_schema() -> Value {
        json!({"type": "object", "properties": {"q": {"type": "string"}}, "required": ["q"]})
    }

    fn config() -> ServerConfig {
        ServerConfig::http("search", "http://localhost:9/mcp")
    }

    fn cache_for(connector: Arc<ScriptedConnector>) -> Arc<ConnectionCache> {
        Arc::new(ConnectionCache::new(connector).without_prober())
    }

    #[tokio::test]
    async fn test_no_connection_until_first_use() {
        let connector = Arc::new(ScriptedConnector::new(tool_server(
            "search",
            json!([{"name": "search", "inputSchema": search_schema()}]),
        )));
        let tool = LazyTool::new(cache_for(connector.clone()), config(), "search", "Web search");

        assert_eq!(tool.name(), "search");
        assert_eq!(tool.description(), "Web search");
        assert_eq!(tool.state(), LazyState::Unresolved);
        assert_eq!(connector.calls(), 0);

        assert_eq!(tool.parameters().await, search_schema());
        assert_eq!(tool.state(), LazyState::Ready);
        assert_eq!(connector.calls(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_parameters_discover_once() {
        let list_calls = Arc::new(AtomicUsize::new(0));
        let counter = list_calls.clone();
        let connector = Arc::new(
            ScriptedConnector::new(Arc::new(move |method: &str, _: &Value| match method {
                "initialize" => Reply::Result(initialize_result("search")),
                "tools/list" => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Reply::Result(json!({"tools": [{"name": "search", "inputSchema": search_schema()}]}))
                }
                _ => Reply::Result(json!({})),
            }))
            .with_delay(Duration::from_millis(30)),
        );
        let tool = Arc::new(LazyTool::new(
            cache_for(connector.clone()),
            config(),
            "search",
            "Web search",
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tool = tool.clone();
                tokio::spawn(async move { tool.parameters().await })
            })
            .collect();
        let mut schemas = Vec::new();
        for handle in handles {
            schemas.push(handle.await.unwrap());
        }

        assert!(schemas.iter().all(|s| *s == search_schema()));
        assert_eq!(connector.calls(), 1);
        assert_eq!(list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_run_forwards_input_and_normalizes() {
        let connector = Arc::new(ScriptedConnector::new(tool_server(
            "search",
            json!([{"name": "search", "inputSchema": search_schema()}]),
        )));
        let tool = LazyTool::new(cache_for(connector), config(), "search", "Web search");

        assert_eq!(tool.run(r#"{"q":"rust"}"#).await.unwrap(), r#"{"q":"rust"}"#);
        assert_eq!(tool.run("").await.unwrap(), "{}");
        assert_eq!(tool.state(), LazyState::Ready);
    }

    #[tokio::test]
    async fn test_connect_failure_returns_to_unresolved() {
        let connector = Arc::new(
            ScriptedConnector::new(tool_server("search", json!([]))).failing_first(1),
        );
        let tool = LazyTool::new(cache_for(connector.clone()), config(), "search", "")
            .with_retry_policy(RetryPolicy::no_retry());

        assert!(tool.run("{}").await.is_err());
        assert_eq!(tool.state(), LazyState::Unresolved);

        tool.run("{}").await.unwrap();
        assert_eq!(connector.calls(), 2);
        assert_eq!(tool.state(), LazyState::Ready);
    }

    #[tokio::test]
    async fn test_connect_error_names_the_server() {
        let cache = Arc::new(ConnectionCache::new(Arc::new(TransportConnector::new())));
        let config = ServerConfig::stdio(
            "scraper",
            "/nonexistent/toolwire-scraper",
            Vec::<String>::new(),
        );
        let tool = LazyTool::new(cache, config, "scrape", "");

        let err = tool.run("{}").await.unwrap_err();
        let text = err.to_string();
        assert!(text.contains("'scraper'"), "{text}");
        assert!(text.contains("command not found"), "{text}");
        assert_eq!(tool.state(), LazyState::Unresolved);
    }

    #[tokio::test]
    async fn test_missing_tool_gets_empty_schema_once() {
        let list_calls = Arc::new(AtomicUsize::new(0));
        let counter = list_calls.clone();
        let connector = Arc::new(ScriptedConnector::new(Arc::new(
            move |method: &str, _: &Value| match method {
                "initialize" => Reply::Result(initialize_result("search")),
                "tools/list" => {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Reply::Error {
                        code: -32603,
                        message: "index unavailable".into(),
                    }
                }
                _ => Reply::Result(json!({})),
            },
        )));
        let tool = LazyTool::new(cache_for(connector), config(), "search", "")
            .with_retry_policy(RetryPolicy::no_retry());

        assert_eq!(tool.parameters().await, empty_object_schema());
        assert_eq!(tool.parameters().await, empty_object_schema());
        assert_eq!(tool.state(), LazyState::Ready);
        assert_eq!(list_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_error_result_is_an_error() {
        let connector = Arc::new(ScriptedConnector::new(Arc::new(
            |method: &str, _: &Value| match method {
                "initialize" => Reply::Result(initialize_result("search")),
                "tools/list" => Reply::Result(json!({"tools": []})),
                "tools/call" => Reply::Result(json!({
                    "content": [{"type": "text", "text": "rate limited"}],
                    "isError": true
                })),
                _ => Reply::Result(json!({})),
            },
        )));
        let tool = LazyTool::new(cache_for(connector), config(), "search", "");

        let err = tool.run(r#"{"q":"x"}"#).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<McpError>(),
            Some(McpError::ToolError { message, .. }) if message == "rate limited"
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_use() {
        let connector = Arc::new(ScriptedConnector::new(tool_server("search", json!([]))));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let tool = LazyTool::new(cache_for(connector.clone()), config(), "search", "")
            .with_cancel(cancel);

        let err = tool.run("{}").await.unwrap_err();
        assert!(err.downcast_ref::<McpError>().is_some_and(McpError::is_cancelled));
        assert_eq!(connector.calls(), 0);
    }

    #[tokio::test]
    async fn test_shared_cache_shares_session() {
        let connector = Arc::new(ScriptedConnector::new(tool_server(
            "search",
            json!([{"name": "a"}, {"name": "b"}]),
        )));
        let cache = Arc::new(
            ConnectionCache::new(connector.clone())
                .with_prober(ReadinessProber::new(1, Duration::from_millis(1))),
        );
        let a = LazyTool::new(cache.clone(), config(), "a", "");
        let b = LazyTool::new(cache, config(), "b", "");

        a.run("{}").await.unwrap();
        b.run("{}").await.unwrap();
        assert_eq!(connector.calls(), 1);
    }
}
