//! Tool interface consumed by the agent's tool-invocation loop
//!
//! Every tool, whatever backs it (a live MCP connection, a lazily connected one,
//! or native code), presents the same shape:
//! - a stable name and a human-readable description
//! - a JSON Schema for its input, which may be discovered on demand
//! - a `run` entry point taking the raw input string and returning text

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Complete schema definition for a tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Unique, stable name for this tool (used by the LLM for invocation)
    pub name: String,

    /// Human-readable description of what this tool does
    pub description: String,

    /// JSON Schema of the tool input (typically an object schema)
    pub parameters: Value,
}

impl ToolSchema {
    pub fn new(name: impl Into<String>, description: impl Into<String>, parameters: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Create a tool schema with no parameters
    pub fn no_params(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(name, description, empty_object_schema())
    }
}

/// The object schema used when a tool declares no parameters, or when its
/// schema could not be discovered.
pub fn empty_object_schema() -> Value {
    json!({
        "type": "object",
        "properties": {}
    })
}

/// Core trait for tool implementations
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the tool is invoked by
    fn name(&self) -> &str;

    /// Human-readable description
    fn description(&self) -> &str;

    /// JSON Schema for the tool input.
    ///
    /// Implementations may resolve this lazily; it never fails; a tool whose
    /// schema is unknown reports [`empty_object_schema`].
    async fn parameters(&self) -> Value;

    /// Runs the tool with the raw input string (usually a JSON object)
    async fn run(&self, input: &str) -> anyhow::Result<String>;

    /// Full schema, assembled from the other accessors
    async fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), self.description(), self.parameters().await)
    }
}

/// Type alias for shared tool instances
pub type ToolBox = Arc<dyn Tool>;

/// Tool registry for managing and discovering available tools
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, ToolBox>,
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Register a tool, replacing any tool previously registered under its name
    pub fn register(&mut self, tool: ToolBox) -> &mut Self {
        self.tools.insert(tool.name().to_string(), tool);
        self
    }

    /// Register multiple tools
    pub fn register_all<I>(&mut self, tools: I) -> &mut Self
    where
        I: IntoIterator<Item = ToolBox>,
    {
        for tool in tools {
            self.register(tool);
        }
        self
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&ToolBox> {
        self.tools.get(name)
    }

    /// Get all registered tools
    pub fn all(&self) -> Vec<&ToolBox> {
        self.tools.values().collect()
    }

    /// Get all tool schemas.
    ///
    /// Lazily resolved tools discover their schema here.
    pub async fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas = Vec::with_capacity(self.tools.len());
        for tool in self.tools.values() {
            schemas.push(tool.schema().await);
        }
        schemas
    }

    /// Get tool names
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Check if a tool is registered
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Run a registered tool by name
    pub async fn run(&self, name: &str, input: &str) -> anyhow::Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("unknown tool: {name}"))?;
        tool.run(input).await
    }

    /// Number of registered tools
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echo the input back"
        }

        async fn parameters(&self) -> Value {
            json!({
                "type": "object",
                "properties": {"text": {"type": "string"}},
                "required": ["text"]
            })
        }

        async fn run(&self, input: &str) -> anyhow::Result<String> {
            Ok(input.to_string())
        }
    }

    #[test]
    fn test_no_params_schema() {
        let schema = ToolSchema::no_params("noop", "Does nothing");
        assert_eq!(schema.parameters["type"], "object");
        assert!(schema.parameters["properties"].as_object().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_default_schema_uses_accessors() {
        let schema = EchoTool.schema().await;
        assert_eq!(schema.name, "echo");
        assert_eq!(schema.description, "Echo the input back");
        assert_eq!(schema.parameters["required"], json!(["text"]));
    }

    #[tokio::test]
    async fn test_registry_run_by_name() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool));

        assert!(registry.has("echo"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.run("echo", "hi").await.unwrap(), "hi");
        assert!(registry.run("missing", "").await.is_err());
        assert_eq!(registry.schemas().await.len(), 1);
    }
}
