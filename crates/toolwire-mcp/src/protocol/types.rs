//! MCP Protocol Types
//!
//! This module defines the MCP-specific types used in the protocol:
//! - Initialization and server identity
//! - Tool definitions and call results
//! - Content types (text, images, audio, resources)
//! - Resources, prompts and sampling

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================
// MCP Protocol Version
// ============================================

/// Current MCP protocol version we support
pub const MCP_PROTOCOL_VERSION: &str = "2025-03-26";

// ============================================
// Initialization Types
// ============================================

/// Parameters for the initialize request
#[derive(Debug, Clone, Serialize)]
pub struct InitializeParams {
    /// Protocol version the client supports
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    /// Client capabilities
    pub capabilities: ClientCapabilities,

    /// Client information
    #[serde(rename = "clientInfo")]
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: MCP_PROTOCOL_VERSION.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: ClientInfo::default(),
        }
    }
}

/// Client capabilities advertised during initialization
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientCapabilities {
    /// Experimental capabilities (reserved for future use)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,

    /// Sampling capabilities (if client can handle sampling requests)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling: Option<Value>,
}

/// Information about the MCP client
#[derive(Debug, Clone, Serialize)]
pub struct ClientInfo {
    /// Client name
    pub name: String,

    /// Client version
    pub version: String,
}

impl Default for ClientInfo {
    fn default() -> Self {
        Self {
            name: "toolwire".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Result of the initialize request
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    /// Protocol version the server supports
    #[serde(rename = "protocolVersion")]
    pub protocol_version: String,

    /// Server capabilities
    #[serde(default)]
    pub capabilities: ServerCapabilities,

    /// Server information
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,

    /// Optional instructions from the server
    #[serde(default)]
    pub instructions: Option<String>,
}

/// Server capabilities advertised during initialization
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerCapabilities {
    /// Tools capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<ToolsCapability>,

    /// Resources capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourcesCapability>,

    /// Prompts capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompts: Option<PromptsCapability>,

    /// Logging capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logging: Option<Value>,

    /// Experimental capabilities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub experimental: Option<Value>,
}

/// Tools capability details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolsCapability {
    /// Whether the server supports tool list changes
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

/// Resources capability details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcesCapability {
    /// Whether the server supports subscriptions
    #[serde(default)]
    pub subscribe: bool,

    /// Whether the server supports list changes
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

/// Prompts capability details
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromptsCapability {
    /// Whether the server supports list changes
    #[serde(rename = "listChanged", default)]
    pub list_changed: bool,
}

/// Information about the MCP server
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    /// Server name
    pub name: String,

    /// Display title
    #[serde(default)]
    pub title: Option<String>,

    /// Server version
    #[serde(default)]
    pub version: Option<String>,
}

/// Identity of a connected server, captured once during the handshake
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerIdentity {
    pub name: String,
    pub title: Option<String>,
    pub version: Option<String>,
    pub protocol_version: String,
    pub capabilities: ServerCapabilities,
    pub instructions: Option<String>,
}

impl From<InitializeResult> for ServerIdentity {
    fn from(result: InitializeResult) -> Self {
        Self {
            name: result.server_info.name,
            title: result.server_info.title,
            version: result.server_info.version,
            protocol_version: result.protocol_version,
            capabilities: result.capabilities,
            instructions: result.instructions,
        }
    }
}

impl ServerIdentity {
    pub fn supports_tools(&self) -> bool {
        self.capabilities.tools.is_some()
    }

    pub fn supports_resource_subscriptions(&self) -> bool {
        self.capabilities
            .resources
            .as_ref()
            .is_some_and(|r| r.subscribe)
    }
}

/// Pagination parameters shared by the list requests
#[derive(Debug, Clone, Default, Serialize)]
pub struct PaginatedParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cursor: Option<String>,
}

// ============================================
// Tool Types
// ============================================

/// MCP Tool Definition
///
/// Represents a tool that can be called by the client.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct McpTool {
    /// Unique tool name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,

    /// JSON Schema for the tool's input parameters
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Result of listing tools
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsListResult {
    /// List of available tools
    pub tools: Vec<McpTool>,

    /// Cursor for pagination (optional)
    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<String>,
}

/// Parameters for calling a tool
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallParams {
    /// Name of the tool to call
    pub name: String,

    /// Arguments to pass to the tool
    pub arguments: Value,
}

/// Result of calling a tool
#[derive(Debug, Clone, Deserialize)]
pub struct McpToolResult {
    /// Content returned by the tool
    #[serde(default)]
    pub content: Vec<McpContent>,

    /// Structured output, for tools declaring an output schema
    #[serde(rename = "structuredContent", default)]
    pub structured_content: Option<Value>,

    /// Whether this result represents an error
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

// ============================================
// Content Types
// ============================================

/// MCP Content - represents various types of content
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum McpContent {
    /// Text content
    #[serde(rename = "text")]
    Text {
        /// The text content
        text: String,
    },

    /// Image content (base64 encoded)
    #[serde(rename = "image")]
    Image {
        /// Base64-encoded image data
        data: String,
        /// MIME type of the image
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Audio content (base64 encoded)
    #[serde(rename = "audio")]
    Audio {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },

    /// Embedded resource content
    #[serde(rename = "resource")]
    Resource {
        /// The embedded resource
        resource: ResourceContents,
    },

    /// Link to a resource the client may read separately
    #[serde(rename = "resource_link")]
    ResourceLink {
        uri: String,
        #[serde(default)]
        name: Option<String>,
        #[serde(rename = "mimeType", default)]
        mime_type: Option<String>,
    },

    /// Content type this client does not understand
    #[serde(other)]
    Unknown,
}

impl McpContent {
    /// Create text content
    pub fn text(content: impl Into<String>) -> Self {
        McpContent::Text {
            text: content.into(),
        }
    }

    /// Get text content if this is a text type
    pub fn as_text(&self) -> Option<&str> {
        match self {
            McpContent::Text { text } => Some(text),
            McpContent::Resource { resource } => resource.text.as_deref(),
            _ => None,
        }
    }
}

// ============================================
// Resource Types
// ============================================

/// MCP Resource Definition
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct McpResource {
    /// Resource URI
    pub uri: String,

    /// Human-readable name
    pub name: String,

    /// Description of the resource
    #[serde(default)]
    pub description: Option<String>,

    /// MIME type
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
}

/// Result of listing resources
#[derive(Debug, Clone, Deserialize)]
pub struct ResourcesListResult {
    /// List of available resources
    pub resources: Vec<McpResource>,

    /// Cursor for pagination
    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<String>,
}

/// Contents of a resource, either text or a base64 blob
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ResourceContents {
    pub uri: String,

    #[serde(rename = "mimeType", default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blob: Option<String>,
}

/// Parameters naming one resource (read, subscribe, unsubscribe)
#[derive(Debug, Clone, Serialize)]
pub struct ResourceUriParams {
    pub uri: String,
}

/// Result of reading a resource
#[derive(Debug, Clone, Deserialize)]
pub struct ReadResourceResult {
    pub contents: Vec<ResourceContents>,
}

/// Params of `notifications/resources/updated`
#[derive(Debug, Clone, Deserialize)]
pub struct ResourceUpdatedParams {
    pub uri: String,
}

// ============================================
// Prompt Types
// ============================================

/// MCP Prompt Definition
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct McpPrompt {
    /// Unique prompt name
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,

    /// Arguments the prompt accepts
    #[serde(default)]
    pub arguments: Option<Vec<PromptArgument>>,
}

/// Argument definition for a prompt
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PromptArgument {
    /// Argument name
    pub name: String,

    /// Description
    #[serde(default)]
    pub description: Option<String>,

    /// Whether this argument is required
    #[serde(default)]
    pub required: bool,
}

/// Result of listing prompts
#[derive(Debug, Clone, Deserialize)]
pub struct PromptsListResult {
    pub prompts: Vec<McpPrompt>,

    #[serde(rename = "nextCursor", default)]
    pub next_cursor: Option<String>,
}

/// Parameters for `prompts/get`
#[derive(Debug, Clone, Serialize)]
pub struct GetPromptParams {
    pub name: String,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub arguments: HashMap<String, String>,
}

/// Conversation role used by prompts and sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a rendered prompt
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PromptMessage {
    pub role: Role,
    pub content: McpContent,
}

/// Result of `prompts/get`
#[derive(Debug, Clone, Deserialize)]
pub struct GetPromptResult {
    #[serde(default)]
    pub description: Option<String>,
    pub messages: Vec<PromptMessage>,
}

// ============================================
// Sampling Types
// ============================================

/// Parameters for `sampling/createMessage`
#[derive(Debug, Clone, Serialize)]
pub struct CreateMessageParams {
    pub messages: Vec<PromptMessage>,

    #[serde(rename = "maxTokens")]
    pub max_tokens: u32,

    #[serde(rename = "systemPrompt", skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,

    #[serde(rename = "stopSequences", skip_serializing_if = "Vec::is_empty")]
    pub stop_sequences: Vec<String>,

    #[serde(rename = "modelPreferences", skip_serializing_if = "Option::is_none")]
    pub model_preferences: Option<Value>,
}

impl CreateMessageParams {
    pub fn new(messages: Vec<PromptMessage>, max_tokens: u32) -> Self {
        Self {
            messages,
            max_tokens,
            system_prompt: None,
            temperature: None,
            stop_sequences: Vec::new(),
            model_preferences: None,
        }
    }
}

/// Result of `sampling/createMessage`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateMessageResult {
    pub role: Role,
    pub content: McpContent,
    pub model: String,
    #[serde(rename = "stopReason", default)]
    pub stop_reason: Option<String>,
}
