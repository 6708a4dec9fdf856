//! MCP Tool Adapter
//!
//! Adapts the tools of a live MCP connection to the [`Tool`] trait, so they can
//! be used alongside native tools. [`crate::LazyTool`] is the deferred
//! counterpart for servers that should not be contacted up front.

use crate::content::{normalize, ToolOutput};
use crate::protocol::{McpError, McpTool};
use crate::retry::RetryingClient;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use toolwire_core::tools::{empty_object_schema, Tool, ToolBox};
use tracing::{debug, instrument};

/// Adapts an MCP tool to implement the [`Tool`] trait
///
/// Calls go through a [`RetryingClient`], so transient failures are retried
/// under the client's policy.
pub struct McpToolAdapter {
    client: RetryingClient,

    /// The MCP tool definition
    tool: McpTool,

    /// Optional namespace prefix for the tool name
    namespace: Option<String>,

    /// Name exposed to the agent
    name: String,

    description: String,
}

impl McpToolAdapter {
    pub fn new(client: RetryingClient, tool: McpTool) -> Self {
        let name = effective_name(None, &tool.name);
        let description = tool.description.clone().unwrap_or_default();
        Self {
            client,
            tool,
            namespace: None,
            name,
            description,
        }
    }

    /// Set a namespace prefix for the tool name
    ///
    /// This is useful when integrating multiple MCP servers to avoid
    /// tool name collisions. The namespace will be prepended to the
    /// tool name with an underscore separator.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let adapter = McpToolAdapter::new(client, tool)
    ///     .with_namespace("filesystem");
    /// // Tool name becomes "filesystem_read_file" instead of "read_file"
    /// ```
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        self.name = effective_name(Some(&namespace), &self.tool.name);
        self.namespace = Some(namespace);
        self
    }

    /// Convert this adapter into a shared Tool (ToolBox)
    pub fn into_toolbox(self) -> ToolBox {
        Arc::new(self)
    }

    /// Name of the tool on the server
    pub fn remote_name(&self) -> &str {
        &self.tool.name
    }
}

/// Tool names must match `^[a-zA-Z0-9_-]+$` for most LLM APIs; dashes become
/// underscores
fn effective_name(namespace: Option<&str>, name: &str) -> String {
    let safe_name = name.replace('-', "_");
    match namespace {
        Some(ns) => format!("{}_{}", ns, safe_name),
        None => safe_name,
    }
}

/// Parse raw tool input; blank input means no arguments
pub(crate) fn parse_input(input: &str) -> Result<Value, McpError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    match serde_json::from_str::<Value>(input)? {
        Value::Object(map) => Ok(Value::Object(map)),
        other => Err(McpError::protocol(format!(
            "tool input must be a JSON object, got: {}",
            other
        ))),
    }
}

/// Call `tool_name` and normalize the result. A result flagged `isError`
/// becomes [`McpError::ToolError`] carrying the server's text.
pub(crate) async fn invoke(
    client: &RetryingClient,
    tool_name: &str,
    input: &str,
) -> Result<String, McpError> {
    let arguments = parse_input(input)?;
    let result = client.call_tool(tool_name, arguments).await?;
    let text = normalize(&ToolOutput::from_result(&result));

    if result.is_error {
        return Err(McpError::ToolError {
            tool: tool_name.to_string(),
            message: text,
        });
    }
    Ok(text)
}

/// A declared input schema, or the empty object schema when there is none
pub(crate) fn schema_or_empty(schema: &Value) -> Value {
    if schema.is_object() {
        schema.clone()
    } else {
        empty_object_schema()
    }
}

#[async_trait]
impl Tool for McpToolAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn parameters(&self) -> Value {
        schema_or_empty(&self.tool.input_schema)
    }

    #[instrument(skip(self, input), fields(tool_name = %self.name))]
    async fn run(&self, input: &str) -> anyhow::Result<String> {
        debug!(
            tool = %self.tool.name,
            namespace = ?self.namespace,
            "Executing MCP tool via adapter"
        );

        // The server knows the tool by its original name
        Ok(invoke(&self.client, &self.tool.name, input).await?)
    }
}

/// Create ToolBox instances for all tools the server currently lists
///
/// # Example
///
/// ```rust,ignore
/// let client = RetryingClient::new(Arc::new(McpClient::connect(transport).await?), RetryPolicy::default());
/// let tools = create_mcp_tools(&client, Some("fs")).await?;
/// // Tools will be named "fs_read_file", "fs_write_file", etc.
/// ```
pub async fn create_mcp_tools(
    client: &RetryingClient,
    namespace: Option<&str>,
) -> Result<Vec<ToolBox>, McpError> {
    let tools = client.list_tools().await?;
    Ok(tools
        .into_iter()
        .map(|tool| {
            let mut adapter = McpToolAdapter::new(client.clone(), tool);
            if let Some(ns) = namespace {
                adapter = adapter.with_namespace(ns);
            }
            adapter.into_toolbox()
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::McpClient;
    use crate::retry::RetryPolicy;
    use crate::test_support::{initialize_result, tool_server, Reply, ScriptedTransport};
    use serde_json::json;

    #[test]
    fn test_effective_name() {
        assert_eq!(effective_name(None, "read_file"), "read_file");
        assert_eq!(effective_name(Some("fs"), "read_file"), "fs_read_file");
    }

    #[test]
    fn test_name_with_dashes_converted_to_underscores() {
        // MCP tools often have dashes in names
        assert_eq!(effective_name(None, "resolve-library-id"), "resolve_library_id");
        assert_eq!(
            effective_name(Some("docs"), "resolve-library-id"),
            "docs_resolve_library_id"
        );
    }

    #[test]
    fn test_parse_input() {
        assert_eq!(parse_input("").unwrap(), json!({}));
        assert_eq!(parse_input("  \n").unwrap(), json!({}));
        assert_eq!(parse_input(r#"{"path":"/tmp"}"#).unwrap(), json!({"path": "/tmp"}));
        assert!(matches!(parse_input("[1,2]"), Err(McpError::Protocol(_))));
        assert!(matches!(parse_input("{not json"), Err(McpError::Json(_))));
    }

    #[test]
    fn test_schema_or_empty() {
        assert_eq!(schema_or_empty(&Value::Null), empty_object_schema());
        let declared = json!({"type": "object", "properties": {"q": {"type": "string"}}});
        assert_eq!(schema_or_empty(&declared), declared);
    }

    async fn client_for(transport: ScriptedTransport) -> RetryingClient {
        let client = Arc::new(McpClient::connect(transport).await.unwrap());
        RetryingClient::new(client, RetryPolicy::no_retry())
    }

    #[tokio::test]
    async fn test_create_tools_and_run() {
        let transport = ScriptedTransport::with_responder(tool_server(
            "docs",
            json!([{
                "name": "query-docs",
                "description": "Search documentation",
                "inputSchema": {"type": "object", "properties": {"q": {"type": "string"}}}
            }]),
        ));
        let client = client_for(transport).await;

        let tools = create_mcp_tools(&client, Some("context7")).await.unwrap();
        assert_eq!(tools.len(), 1);
        let tool = &tools[0];
        assert_eq!(tool.name(), "context7_query_docs");
        assert_eq!(tool.description(), "Search documentation");
        assert_eq!(tool.parameters().await["properties"]["q"]["type"], "string");

        let output = tool.run(r#"{"q":"tokio"}"#).await.unwrap();
        assert_eq!(output, r#"{"q":"tokio"}"#);
    }

    #[tokio::test]
    async fn test_error_result_surfaces_server_text() {
        let transport = ScriptedTransport::new(|method, _| match method {
            "initialize" => Reply::Result(initialize_result("fs")),
            "tools/call" => Reply::Result(json!({
                "content": [{"type": "text", "text": "ENOENT: /missing"}],
                "isError": true
            })),
            _ => Reply::Result(json!({})),
        });
        let client = client_for(transport).await;
        let adapter = McpToolAdapter::new(
            client,
            McpTool {
                name: "read_file".into(),
                description: None,
                input_schema: Value::Null,
            },
        );

        let err = adapter.run(r#"{"path":"/missing"}"#).await.unwrap_err();
        match err.downcast_ref::<McpError>() {
            Some(McpError::ToolError { tool, message }) => {
                assert_eq!(tool, "read_file");
                assert_eq!(message, "ENOENT: /missing");
            }
            other => panic!("expected tool error, got {other:?}"),
        }
    }
}
