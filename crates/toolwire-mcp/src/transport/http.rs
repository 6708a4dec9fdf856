//! Streamable HTTP Transport for MCP
//!
//! Every JSON-RPC message is POSTed to one endpoint. The server answers with
//! either a JSON body or an event stream carrying the response (possibly
//! preceded by notifications), or `202 Accepted` for notifications. A session
//! id handed out via `Mcp-Session-Id` is echoed on every later request.
//!
//! ## Example
//!
//! ```rust,ignore
//! use toolwire_mcp::transport::HttpTransport;
//!
//! let transport = HttpTransport::new("https://your-mcp-server.com/mcp")
//!     .bearer_token("token")
//!     .build()?;
//!
//! let client = McpClient::connect(transport).await?;
//! ```

use crate::protocol::McpError;
use crate::transport::auth::AuthorizedClient;
use crate::transport::event_stream::SseDecoder;
use crate::transport::sse::SseTransport;
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// Header carrying the streamable-HTTP session id
pub const SESSION_HEADER: &str = "mcp-session-id";

/// HTTP Transport for MCP communication
pub struct HttpTransport {
    /// Endpoint of the MCP server
    url: String,
    /// HTTP client, decorated with the bearer token if one is configured
    client: AuthorizedClient,
    /// Custom headers to include in requests
    headers: HashMap<String, String>,
    /// Per-request timeout
    timeout: Duration,
    /// Session id assigned by the server
    session_id: Option<String>,
    /// Connection state
    connected: AtomicBool,
    /// Messages received but not yet handed to `receive()`, in arrival order
    inbox: VecDeque<String>,
}

impl HttpTransport {
    /// Create a new HTTP transport builder
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let transport = HttpTransport::new("https://mcp-server.example.com/api")
    ///     .with_header("X-Team", "tools")
    ///     .build()?;
    /// ```
    pub fn new(url: impl Into<String>) -> HttpTransportBuilder {
        HttpTransportBuilder::new(url)
    }

    /// Get the server URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Session id assigned by the server, once one has been
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    fn buffer_body(&mut self, content_type: &str, body: String) {
        if content_type.starts_with("text/event-stream") {
            for event in SseDecoder::decode_all(&body) {
                if event.name() == "message" && !event.data.is_empty() {
                    self.inbox.push_back(event.data);
                }
            }
        } else if !body.trim().is_empty() {
            self.inbox.push_back(body);
        }
    }
}

/// Builder for HttpTransport and SseTransport
///
/// Provides a fluent API for configuring HTTP transport options.
pub struct HttpTransportBuilder {
    url: String,
    headers: HashMap<String, String>,
    timeout_secs: u64,
    token: Option<String>,
}

impl HttpTransportBuilder {
    /// Create a new builder with the given URL
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            timeout_secs: 30,
            token: None,
        }
    }

    /// Add a custom header to all requests
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add multiple headers at once
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Send `Authorization: Bearer <token>` on every request
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Set the request timeout in seconds (default: 30)
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    fn client(&self) -> Result<AuthorizedClient, McpError> {
        // No client-wide timeout: the SSE variant keeps a stream open for the
        // whole session. Requests set their own.
        let inner = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.timeout_secs))
            .build()
            .map_err(|e| McpError::Transport(format!("Failed to create HTTP client: {}", e)))?;
        let client = AuthorizedClient::new(inner);
        Ok(match &self.token {
            Some(token) => client.with_bearer(token.clone()),
            None => client,
        })
    }

    /// Build a streamable HTTP transport
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn build(self) -> Result<HttpTransport, McpError> {
        let client = self.client()?;
        Ok(HttpTransport {
            url: self.url,
            client,
            headers: self.headers,
            timeout: Duration::from_secs(self.timeout_secs),
            session_id: None,
            connected: AtomicBool::new(true),
            inbox: VecDeque::new(),
        })
    }

    /// Open an SSE session: subscribe to the event stream and wait for the
    /// server to announce its message endpoint
    pub async fn connect_sse(self) -> Result<SseTransport, McpError> {
        let client = self.client()?;
        SseTransport::open(
            self.url,
            client,
            self.headers,
            Duration::from_secs(self.timeout_secs),
        )
        .await
    }
}

#[async_trait]
impl super::Transport for HttpTransport {
    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        trace!(url = %self.url, "MCP HTTP send: {}", message);

        let mut request = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json")
            .header("Accept", "application/json, text/event-stream");

        for (key, value) in &self.headers {
            request = request.header(key, value);
        }
        if let Some(session) = &self.session_id {
            request = request.header(SESSION_HEADER, session);
        }

        let response = request.body(message.to_string()).send().await.map_err(|e| {
            if e.is_timeout() {
                McpError::Timeout(self.timeout)
            } else {
                McpError::Transport(format!("HTTP request failed: {}", e))
            }
        })?;

        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            if self.session_id.as_deref() != Some(session) {
                debug!(url = %self.url, "MCP HTTP session established");
                self.session_id = Some(session.to_string());
            }
        }

        let status = response.status();
        if status == StatusCode::ACCEPTED {
            return Ok(());
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND && self.session_id.is_some() {
                self.connected.store(false, Ordering::SeqCst);
                return Err(McpError::Transport(format!(
                    "HTTP session expired (404): {}",
                    body
                )));
            }
            return Err(McpError::Transport(format!(
                "HTTP error {}: {}",
                status, body
            )));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_ascii_lowercase();

        let body = response
            .text()
            .await
            .map_err(|e| McpError::Transport(format!("Failed to read response: {}", e)))?;

        trace!(url = %self.url, "MCP HTTP response: {}", body);
        self.buffer_body(&content_type, body);

        Ok(())
    }

    async fn receive(&mut self) -> Result<String, McpError> {
        self.inbox.pop_front().ok_or_else(|| {
            McpError::Transport("No response available - call send() first".to_string())
        })
    }

    async fn close(&mut self) -> Result<(), McpError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            if let Some(session) = self.session_id.take() {
                // Servers may not support explicit termination; ignore failures
                let result = self
                    .client
                    .delete(&self.url)
                    .timeout(self.timeout)
                    .header(SESSION_HEADER, session)
                    .send()
                    .await;
                if let Err(e) = result {
                    debug!(url = %self.url, error = %e, "MCP HTTP session termination failed");
                }
            }
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    // Only messages trailing an earlier reply can be read without a send
    fn has_push_channel(&self) -> bool {
        !self.inbox.is_empty()
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("url", &self.url)
            .field("headers", &self.headers.keys().collect::<Vec<_>>())
            .field("client", &self.client)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish()
    }
}
