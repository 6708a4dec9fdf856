//! MCP Transport Layer
//!
//! This module defines the transport abstraction for MCP communication.
//! Transports handle the low-level message sending and receiving.
//!
//! - [`stdio`]: a local subprocess speaking newline-delimited JSON
//! - [`http`]: the streamable HTTP sub-protocol (POST per message)
//! - [`sse`]: the older HTTP+SSE sub-protocol (event stream plus POST endpoint)

pub mod auth;
pub mod event_stream;
pub mod http;
pub mod sse;
#[cfg(feature = "stdio")]
pub mod stdio;

use crate::protocol::McpError;
use async_trait::async_trait;

pub use auth::AuthorizedClient;
pub use http::{HttpTransport, HttpTransportBuilder};
pub use sse::SseTransport;
#[cfg(feature = "stdio")]
pub use stdio::{StdioConfig, StdioTransport};

/// Transport trait for MCP communication
///
/// Implementations handle the actual message sending and receiving
/// over different channels (stdio, HTTP, SSE).
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send a message to the MCP server
    async fn send(&mut self, message: &str) -> Result<(), McpError>;

    /// Receive a message from the MCP server.
    ///
    /// Must be cancel safe: dropping the future before it completes may not
    /// lose a partially read message.
    async fn receive(&mut self) -> Result<String, McpError>;

    /// Close the transport connection
    async fn close(&mut self) -> Result<(), McpError>;

    /// Check if the transport is still connected
    fn is_connected(&self) -> bool;

    /// Whether the server can push messages outside a request/response
    /// cycle. When false, `receive` only yields replies to sent messages.
    fn has_push_channel(&self) -> bool {
        true
    }

    /// Recent diagnostic output of the peer (stderr of a subprocess), if any
    fn diagnostics(&self) -> Option<String> {
        None
    }
}
