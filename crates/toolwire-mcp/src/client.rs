//! MCP Client Implementation
//!
//! The MCP client handles the protocol-level communication with one MCP server:
//! the initialization handshake, tool/resource/prompt operations, sampling, and
//! resource watches. One request/response cycle runs at a time per client.

use crate::protocol::{
    messages::{
        error_codes, IncomingMessage, JsonRpcError, JsonRpcNotification, JsonRpcRequest,
        JsonRpcResponse, OutgoingResponse, RequestId, ServerNotification, ServerRequest,
    },
    types::{
        CreateMessageParams, CreateMessageResult, GetPromptParams, GetPromptResult,
        InitializeParams, InitializeResult, McpPrompt, McpResource, McpTool, McpToolResult,
        PaginatedParams, PromptsListResult, ReadResourceResult, ResourceUpdatedParams,
        ResourceUriParams, ResourcesListResult, ServerIdentity, ToolCallParams, ToolsListResult,
    },
    ErrorKind, McpError,
};
use crate::transport::Transport;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::time::timeout;
use tracing::{debug, info, instrument, trace, warn};

/// Default timeout for MCP requests
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Capacity of the notification fan-out channel
const NOTIFICATION_CAPACITY: usize = 64;

/// How long a resource watch waits on the transport before yielding it
const WATCH_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Notification a server sends when a subscribed resource changed
pub const RESOURCE_UPDATED: &str = "notifications/resources/updated";

/// MCP Client Configuration
#[derive(Debug, Clone)]
pub struct McpClientConfig {
    /// Timeout for individual requests
    pub request_timeout: Duration,

    /// Custom client name (for initialization)
    pub client_name: Option<String>,

    /// Custom client version (for initialization)
    pub client_version: Option<String>,

    /// Server name used in log fields and error messages
    pub label: Option<String>,
}

impl Default for McpClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_TIMEOUT,
            client_name: None,
            client_version: None,
            label: None,
        }
    }
}

impl McpClientConfig {
    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// MCP Client
///
/// A live session with one MCP server. Owns the transport, so dropping the last
/// handle tears the session down (a stdio server is killed).
pub struct McpClient {
    /// The underlying transport
    transport: Mutex<Box<dyn Transport>>,

    /// Request ID counter
    request_id: AtomicU64,

    /// Client configuration
    config: McpClientConfig,

    /// Server identity, captured by the handshake
    identity: Option<ServerIdentity>,

    /// Whether the handshake completed and the client was not closed since
    initialized: AtomicBool,

    /// Fan-out of server notifications to resource watches
    notifications: broadcast::Sender<ServerNotification>,
}

impl McpClient {
    fn new_uninit(transport: Box<dyn Transport>, config: McpClientConfig) -> Self {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        Self {
            transport: Mutex::new(transport),
            request_id: AtomicU64::new(1),
            config,
            identity: None,
            initialized: AtomicBool::new(false),
            notifications,
        }
    }

    /// Connect to an MCP server and perform initialization
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let transport = HttpTransport::new("https://mcp.example.com/mcp").build()?;
    /// let client = McpClient::connect(transport).await?;
    /// ```
    pub async fn connect<T: Transport + 'static>(transport: T) -> Result<Self, McpError> {
        Self::connect_with_config(transport, McpClientConfig::default()).await
    }

    /// Connect with custom configuration
    pub async fn connect_with_config<T: Transport + 'static>(
        transport: T,
        config: McpClientConfig,
    ) -> Result<Self, McpError> {
        Self::connect_boxed(Box::new(transport), config).await
    }

    /// Connect over an already boxed transport
    #[instrument(skip_all, name = "mcp_connect", fields(server = config.label.as_deref().unwrap_or("")))]
    pub async fn connect_boxed(
        transport: Box<dyn Transport>,
        config: McpClientConfig,
    ) -> Result<Self, McpError> {
        let mut client = Self::new_uninit(transport, config);

        if let Err(err) = client.initialize().await {
            let diagnostics = client.transport.lock().await.diagnostics();
            return Err(match diagnostics {
                Some(stderr) if err.kind() == ErrorKind::Connection => McpError::Transport(
                    format!("{}; server stderr:\n{}", err, stderr),
                ),
                _ => err,
            });
        }

        Ok(client)
    }

    /// Perform the MCP initialization handshake
    async fn initialize(&mut self) -> Result<(), McpError> {
        debug!("Starting MCP initialization handshake");

        let mut params = InitializeParams::default();
        if let Some(ref name) = self.config.client_name {
            params.client_info.name = name.clone();
        }
        if let Some(ref version) = self.config.client_version {
            params.client_info.version = version.clone();
        }

        let result: InitializeResult = self.send_request("initialize", Some(params)).await?;

        info!(
            server = %self.label(),
            server_name = %result.server_info.name,
            server_version = ?result.server_info.version,
            protocol_version = %result.protocol_version,
            "MCP server initialized"
        );

        self.identity = Some(ServerIdentity::from(result));

        self.send_notification("notifications/initialized", None::<()>)
            .await?;

        self.initialized.store(true, Ordering::SeqCst);
        debug!("MCP initialization complete");

        Ok(())
    }

    /// Server name used in logs: the configured label, else the name the
    /// server reported
    pub fn label(&self) -> &str {
        self.config
            .label
            .as_deref()
            .or(self.identity.as_ref().map(|i| i.name.as_str()))
            .unwrap_or("mcp")
    }

    /// Identity reported by the server during the handshake
    pub fn identity(&self) -> Option<&ServerIdentity> {
        self.identity.as_ref()
    }

    /// Check if the client is initialized
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Check if the transport is still connected
    pub async fn is_connected(&self) -> bool {
        let transport = self.transport.lock().await;
        transport.is_connected()
    }

    /// Recent diagnostic output of the server process, if any
    pub async fn diagnostics(&self) -> Option<String> {
        self.transport.lock().await.diagnostics()
    }

    /// Liveness check
    pub async fn ping(&self) -> Result<(), McpError> {
        self.ensure_initialized()?;
        let _: Value = self.send_request("ping", None::<()>).await?;
        Ok(())
    }

    /// List every tool the server offers, following pagination
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        self.ensure_initialized()?;
        debug!(server = %self.label(), "Listing MCP tools");

        let mut tools = Vec::new();
        let mut cursor = None;
        loop {
            let page: ToolsListResult = self
                .send_request("tools/list", Some(PaginatedParams { cursor: cursor.clone() }))
                .await?;
            for tool in &page.tools {
                trace!(tool_name = %tool.name, description = ?tool.description, "Found MCP tool");
            }
            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(tools)
    }

    /// Call a tool on the MCP server
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let result = client.call_tool("read_file", serde_json::json!({
    ///     "path": "/tmp/test.txt"
    /// })).await?;
    /// ```
    #[instrument(skip(self, arguments), fields(server = %self.label(), tool_name = %name))]
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<McpToolResult, McpError> {
        self.ensure_initialized()?;
        debug!(tool_name = %name, "Calling MCP tool");

        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };

        let result: McpToolResult = self.send_request("tools/call", Some(params)).await?;

        if result.is_error {
            warn!(tool_name = %name, "Tool returned error result");
        } else {
            debug!(
                tool_name = %name,
                content_count = result.content.len(),
                "Tool call successful"
            );
        }

        Ok(result)
    }

    /// Call a tool with typed arguments
    pub async fn call_tool_typed<A: Serialize>(
        &self,
        name: &str,
        arguments: A,
    ) -> Result<McpToolResult, McpError> {
        let args = serde_json::to_value(arguments)?;
        self.call_tool(name, args).await
    }

    /// List every resource, following pagination
    pub async fn list_resources(&self) -> Result<Vec<McpResource>, McpError> {
        self.ensure_initialized()?;
        let mut resources = Vec::new();
        let mut cursor = None;
        loop {
            let page: ResourcesListResult = self
                .send_request(
                    "resources/list",
                    Some(PaginatedParams { cursor: cursor.clone() }),
                )
                .await?;
            resources.extend(page.resources);
            match page.next_cursor {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(resources)
    }

    /// Read one resource
    pub async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult, McpError> {
        self.ensure_initialized()?;
        self.send_request(
            "resources/read",
            Some(ResourceUriParams {
                uri: uri.to_string(),
            }),
        )
        .await
    }

    pub async fn subscribe_resource(&self, uri: &str) -> Result<(), McpError> {
        self.ensure_initialized()?;
        let _: Value = self
            .send_request(
                "resources/subscribe",
                Some(ResourceUriParams {
                    uri: uri.to_string(),
                }),
            )
            .await?;
        Ok(())
    }

    pub async fn unsubscribe_resource(&self, uri: &str) -> Result<(), McpError> {
        self.ensure_initialized()?;
        let _: Value = self
            .send_request(
                "resources/unsubscribe",
                Some(ResourceUriParams {
                    uri: uri.to_string(),
                }),
            )
            .await?;
        Ok(())
    }

    /// Subscribe to a resource and return a stream of its update notifications
    pub async fn watch_resource(self: &Arc<Self>, uri: &str) -> Result<ResourceWatch, McpError> {
        // Receiver first, so no update between subscribe and return is lost
        let rx = self.notifications.subscribe();
        self.subscribe_resource(uri).await?;
        debug!(server = %self.label(), uri = %uri, "Watching MCP resource");
        Ok(ResourceWatch {
            client: Arc::clone(self),
            uri: uri.to_string(),
            rx,
        })
    }

    /// List every prompt, following pagination
    pub async fn list_prompts(&self) -> Result<Vec<McpPrompt>, McpError> {
        self.ensure_initialized()?;
        let mut prompts = Vec::new();
        let mut cursor = None;
        loop {
            let page: PromptsListResult = self
                .send_request("prompts/list", Some(PaginatedParams { cursor: cursor.clone() }))
                .await?;
            prompts.extend(page.prompts);
            match page.next_cursor {
                Some(next) if Some(&next) != cursor.as_ref() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(prompts)
    }

    /// Render a prompt with the given arguments
    pub async fn get_prompt(
        &self,
        name: &str,
        arguments: HashMap<String, String>,
    ) -> Result<GetPromptResult, McpError> {
        self.ensure_initialized()?;
        self.send_request(
            "prompts/get",
            Some(GetPromptParams {
                name: name.to_string(),
                arguments,
            }),
        )
        .await
    }

    /// Ask the server to sample a message
    pub async fn create_message(
        &self,
        params: CreateMessageParams,
    ) -> Result<CreateMessageResult, McpError> {
        self.ensure_initialized()?;
        self.send_request("sampling/createMessage", Some(params))
            .await
    }

    /// Close the client connection
    pub async fn close(&self) -> Result<(), McpError> {
        debug!(server = %self.label(), "Closing MCP client connection");
        let mut transport = self.transport.lock().await;
        self.initialized.store(false, Ordering::SeqCst);
        transport.close().await
    }

    /// Read whatever the server pushes for up to `wait`, dispatching it.
    /// Returns the number of messages handled.
    pub async fn poll_notifications(&self, wait: Duration) -> Result<usize, McpError> {
        let mut transport = self.transport.lock().await;
        if !transport.has_push_channel() {
            drop(transport);
            tokio::time::sleep(wait).await;
            return Ok(0);
        }
        match timeout(wait, transport.receive()).await {
            Err(_) => Ok(0),
            Ok(Err(e)) => Err(e),
            Ok(Ok(raw)) => {
                let message: IncomingMessage = serde_json::from_str(&raw)?;
                match message {
                    IncomingMessage::Notification(notif) => self.dispatch_notification(notif),
                    IncomingMessage::Request(request) => {
                        self.answer_server_request(transport.as_mut(), request)
                            .await?
                    }
                    IncomingMessage::Response(response) => {
                        debug!(id = %response.id, "Discarding response nobody is waiting for");
                    }
                }
                Ok(1)
            }
        }
    }

    // ========================================
    // Internal Helper Methods
    // ========================================

    fn ensure_initialized(&self) -> Result<(), McpError> {
        if !self.is_initialized() {
            return Err(McpError::NotInitialized);
        }
        Ok(())
    }

    fn next_request_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst))
    }

    fn dispatch_notification(&self, notification: ServerNotification) {
        trace!(method = %notification.method, "Received server notification");
        // Err only means nobody is watching
        let _ = self.notifications.send(notification);
    }

    async fn answer_server_request(
        &self,
        transport: &mut dyn Transport,
        request: ServerRequest,
    ) -> Result<(), McpError> {
        let reply = if request.method == "ping" {
            OutgoingResponse::success(request.id, Value::Object(Default::default()))
        } else {
            debug!(method = %request.method, "Rejecting unsupported server request");
            OutgoingResponse::failure(
                request.id,
                JsonRpcError {
                    code: error_codes::METHOD_NOT_FOUND,
                    message: format!("Method not supported by client: {}", request.method),
                    data: None,
                },
            )
        };
        transport.send(&serde_json::to_string(&reply)?).await
    }

    async fn send_request<P: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> Result<R, McpError> {
        let id = self.next_request_id();

        let mut request = JsonRpcRequest::new(id.clone(), method);
        if let Some(p) = params {
            request = request.with_params(serde_json::to_value(p)?);
        }

        let request_json = serde_json::to_string(&request)?;
        trace!(method = %method, id = %id, "Sending JSON-RPC request");

        // Hold the transport for the entire request/response cycle so
        // concurrent requests cannot interleave their replies.
        let response = timeout(self.config.request_timeout, async {
            let mut transport = self.transport.lock().await;

            transport.send(&request_json).await?;

            loop {
                let response_json = transport.receive().await?;
                let message: IncomingMessage = serde_json::from_str(&response_json)?;

                match message {
                    IncomingMessage::Response(response) => {
                        if is_stale(&response, &id) {
                            // Reply to a request that timed out earlier
                            debug!(stale_id = %response.id, "Skipping stale response");
                            continue;
                        }
                        return Ok::<JsonRpcResponse, McpError>(response);
                    }
                    IncomingMessage::Notification(notif) => {
                        self.dispatch_notification(notif);
                        continue;
                    }
                    IncomingMessage::Request(server_request) => {
                        self.answer_server_request(transport.as_mut(), server_request)
                            .await?;
                        continue;
                    }
                }
            }
        })
        .await
        .map_err(|_| McpError::Timeout(self.config.request_timeout))??;

        if response.id != id {
            return Err(McpError::ResponseIdMismatch {
                expected: id.to_string(),
                actual: response.id.to_string(),
            });
        }

        let result = response.into_result()?;

        serde_json::from_value(result).map_err(McpError::from)
    }

    async fn send_notification<P: Serialize>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> Result<(), McpError> {
        let mut notification = JsonRpcNotification::new(method);
        if let Some(p) = params {
            notification = notification.with_params(serde_json::to_value(p)?);
        }

        let notification_json = serde_json::to_string(&notification)?;
        trace!(method = %method, "Sending JSON-RPC notification");

        let mut transport = self.transport.lock().await;
        transport.send(&notification_json).await
    }
}

fn is_stale(response: &JsonRpcResponse, expected: &RequestId) -> bool {
    match (&response.id, expected) {
        (RequestId::Number(got), RequestId::Number(want)) => got < want,
        _ => false,
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("label", &self.label())
            .field("identity", &self.identity)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Update notifications for one subscribed resource.
///
/// Not retried: a half-open stream cannot be safely re-established behind the
/// caller's back.
pub struct ResourceWatch {
    client: Arc<McpClient>,
    uri: String,
    rx: broadcast::Receiver<ServerNotification>,
}

impl ResourceWatch {
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Wait for the next update of the watched resource
    pub async fn next(&mut self) -> Result<(), McpError> {
        loop {
            match self.rx.try_recv() {
                Ok(notification) => {
                    if self.matches(&notification) {
                        return Ok(());
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => {
                    self.client.poll_notifications(WATCH_POLL_INTERVAL).await?;
                }
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!(uri = %self.uri, skipped, "Resource watch lagged; updates coalesced");
                    return Ok(());
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(McpError::Transport("connection closed".into()));
                }
            }
        }
    }

    /// Unsubscribe and end the watch
    pub async fn stop(self) -> Result<(), McpError> {
        self.client.unsubscribe_resource(&self.uri).await
    }

    fn matches(&self, notification: &ServerNotification) -> bool {
        notification.method == RESOURCE_UPDATED
            && notification
                .params
                .clone()
                .and_then(|p| serde_json::from_value::<ResourceUpdatedParams>(p).ok())
                .is_some_and(|p| p.uri == self.uri)
    }
}
