//! # toolwire-mcp
//!
//! Connection layer between a tool-consuming agent and Model Context Protocol
//! (MCP) servers, local subprocesses or remote HTTP endpoints.
//!
//! ## Features
//!
//! - **Transports**: stdio subprocesses, streamable HTTP and HTTP+SSE, with
//!   optional bearer authentication
//! - **Connection cache**: one live session per server, shared by every caller
//! - **Retry**: classified, jittered exponential backoff with cancellation
//! - **Declarative config**: a chainable builder, compact server URLs, presets
//!   and JSON documents
//! - **Lazy tools**: tools that connect and discover their schema on first use
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use toolwire_mcp::{ConfigBuilder, ConnectionCache, LazyTool, TransportConnector};
//!
//! let cache = Arc::new(ConnectionCache::new(Arc::new(TransportConnector::new())));
//!
//! // Connect eagerly and adapt everything the server lists
//! let built = ConfigBuilder::new().add_preset("fs", "filesystem").build(&cache).await?;
//! let tools = toolwire_mcp::create_mcp_tools(&built.connected[0].client, Some("fs")).await?;
//!
//! // Or defer until the agent first touches the tool
//! let config = toolwire_mcp::parse_server_url("time", "mcp://time")?;
//! let now = LazyTool::new(cache.clone(), config, "get_current_time", "Current time");
//! ```

pub mod protocol;
pub mod transport;

mod builder;
mod cache;
mod client;
mod config;
mod connector;
mod content;
mod lazy_tool;
mod presets;
mod readiness;
mod registry;
mod retry;
mod tool_adapter;

#[cfg(test)]
mod test_support;

// Re-exports
pub use builder::{parse_server_url, BuiltServers, ConfigBuilder, ConnectedServer, ServerFailure};
pub use cache::ConnectionCache;
pub use tokio_util::sync::CancellationToken;
pub use client::{McpClient, McpClientConfig, ResourceWatch, RESOURCE_UPDATED};
pub use config::{HttpVariant, ServerConfig, ServerKey, ServerKind};
pub use connector::{resolve_command, Connector, TransportConnector};
pub use content::{content_text, normalize, ToolOutput};
pub use lazy_tool::{LazyState, LazyTool};
pub use presets::{preset, presets, Preset};
pub use protocol::{
    error::{ConfigError, ErrorKind, McpError, McpResult},
    types::{McpContent, McpTool, McpToolResult, ServerIdentity},
};
pub use readiness::ReadinessProber;
pub use registry::{
    PackageDescriptor, RegistryClient, RemoteDescriptor, ServerDescriptor, DEFAULT_REGISTRY_URL,
};
pub use retry::{retry_with_policy, Backoff, RetryPolicy, RetryingClient};
pub use tool_adapter::{create_mcp_tools, McpToolAdapter};

#[cfg(feature = "stdio")]
pub use transport::stdio::StdioTransport;
