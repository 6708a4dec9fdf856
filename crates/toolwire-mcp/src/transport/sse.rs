//! HTTP+SSE Transport for MCP
//!
//! The client GETs a long-lived event stream. The server's first `endpoint`
//! event names the URL messages must be POSTed to; responses and notifications
//! arrive as `message` events on the stream.

use crate::protocol::McpError;
use crate::transport::auth::AuthorizedClient;
use crate::transport::event_stream::SseDecoder;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Messages buffered between the stream reader and `receive()`
const INBOX_CAPACITY: usize = 256;

pub struct SseTransport {
    /// URL of the event stream
    url: String,
    /// URL announced by the server for POSTing messages
    endpoint: Url,
    client: AuthorizedClient,
    headers: HashMap<String, String>,
    timeout: Duration,
    inbox: mpsc::Receiver<Result<String, McpError>>,
    reader: JoinHandle<()>,
    connected: Arc<AtomicBool>,
}

impl SseTransport {
    pub(crate) async fn open(
        url: String,
        client: AuthorizedClient,
        headers: HashMap<String, String>,
        timeout: Duration,
    ) -> Result<Self, McpError> {
        let base = Url::parse(&url)
            .map_err(|e| McpError::Transport(format!("Invalid SSE URL {}: {}", url, e)))?;

        let mut request = client.get(base.clone()).header(ACCEPT, "text/event-stream");
        for (key, value) in &headers {
            request = request.header(key, value);
        }
        let response = tokio::time::timeout(timeout, request.send())
            .await
            .map_err(|_| McpError::Timeout(timeout))?
            .map_err(|e| McpError::Transport(format!("SSE connect failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!(
                "HTTP error {}: {}",
                status, body
            )));
        }

        let (endpoint_tx, endpoint_rx) = oneshot::channel();
        let (inbox_tx, inbox) = mpsc::channel(INBOX_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));
        let reader = tokio::spawn(read_stream(
            response,
            base,
            endpoint_tx,
            inbox_tx,
            connected.clone(),
        ));

        let endpoint = match tokio::time::timeout(timeout, endpoint_rx).await {
            Ok(Ok(Ok(endpoint))) => endpoint,
            Ok(Ok(Err(e))) => {
                reader.abort();
                return Err(e);
            }
            Ok(Err(_)) => {
                reader.abort();
                return Err(McpError::Transport(
                    "SSE stream closed before the server announced its endpoint".into(),
                ));
            }
            Err(_) => {
                reader.abort();
                return Err(McpError::Timeout(timeout));
            }
        };
        debug!(url = %url, endpoint = %endpoint, "MCP SSE session established");

        Ok(Self {
            url,
            endpoint,
            client,
            headers,
            timeout,
            inbox,
            reader,
            connected,
        })
    }

    /// Get the event stream URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// URL messages are POSTed to
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

async fn read_stream(
    response: reqwest::Response,
    base: Url,
    endpoint_tx: oneshot::Sender<Result<Url, McpError>>,
    inbox: mpsc::Sender<Result<String, McpError>>,
    connected: Arc<AtomicBool>,
) {
    let mut endpoint_tx = Some(endpoint_tx);
    let mut decoder = SseDecoder::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                let _ = inbox
                    .send(Err(McpError::Transport(format!("SSE stream error: {}", e))))
                    .await;
                break;
            }
        };
        for event in decoder.feed(&chunk) {
            match event.name() {
                "endpoint" => match base.join(event.data.trim()) {
                    Ok(endpoint) => {
                        let announced = if same_origin(&base, &endpoint) {
                            Ok(endpoint)
                        } else {
                            warn!(endpoint = %endpoint, "Rejecting cross-origin SSE endpoint");
                            Err(McpError::Transport(format!(
                                "SSE endpoint {} is not on the origin of {}",
                                endpoint.origin().ascii_serialization(),
                                base.origin().ascii_serialization()
                            )))
                        };
                        if let Some(tx) = endpoint_tx.take() {
                            let _ = tx.send(announced);
                        }
                    }
                    Err(e) => {
                        warn!(data = %event.data, error = %e, "Ignoring malformed SSE endpoint")
                    }
                },
                "message" => {
                    trace!("MCP SSE message: {}", event.data);
                    if inbox.send(Ok(event.data)).await.is_err() {
                        // Transport dropped
                        return;
                    }
                }
                other => trace!(event = %other, "Ignoring SSE event"),
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    debug!("MCP SSE stream ended");
}

/// Messages may only be POSTed where the stream came from; the bearer token
/// travels with them
fn same_origin(base: &Url, endpoint: &Url) -> bool {
    base.scheme() == endpoint.scheme()
        && base.host_str() == endpoint.host_str()
        && base.port_or_known_default() == endpoint.port_or_known_default()
}

#[async_trait]
impl super::Transport for SseTransport {
    async fn send(&mut self, message: &str) -> Result<(), McpError> {
        trace!(endpoint = %self.endpoint, "MCP SSE send: {}", message);

        let mut request = self
            .client
            .post(self.endpoint.clone())
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/json");
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = request.body(message.to_string()).send().await.map_err(|e| {
            if e.is_timeout() {
                McpError::Timeout(self.timeout)
            } else {
                McpError::Transport(format!("HTTP request failed: {}", e))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(McpError::Transport(format!(
                "HTTP error {}: {}",
                status, body
            )));
        }
        Ok(())
    }

    async fn receive(&mut self) -> Result<String, McpError> {
        match self.inbox.recv().await {
            Some(message) => message,
            None => Err(McpError::Transport("SSE stream closed".into())),
        }
    }

    async fn close(&mut self) -> Result<(), McpError> {
        self.connected.store(false, Ordering::SeqCst);
        self.reader.abort();
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

impl std::fmt::Debug for SseTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SseTransport")
            .field("url", &self.url)
            .field("endpoint", &self.endpoint.as_str())
            .field("client", &self.client)
            .field("connected", &self.connected.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{HttpTransport, Transport};
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_endpoint_discovery_and_messages() {
        let server = MockServer::start().await;
        let stream = "event: endpoint\ndata: /messages?sessionId=42\n\n\
                      event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{}}\n\n";
        Mock::given(method("GET"))
            .and(path("/sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(stream, "text/event-stream"),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .respond_with(ResponseTemplate::new(202))
            .expect(1)
            .mount(&server)
            .await;

        let mut transport = HttpTransport::new(format!("{}/sse", server.uri()))
            .connect_sse()
            .await
            .unwrap();
        assert_eq!(transport.endpoint().path(), "/messages");
        assert_eq!(transport.endpoint().query(), Some("sessionId=42"));
        assert!(format!("{transport:?}").contains("connected: true"));

        transport.send(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).await.unwrap();
        assert!(transport.receive().await.unwrap().contains("\"id\":1"));

        // the mocked stream ends after its body; the transport notices
        assert!(transport.receive().await.is_err());
        transport.close().await.unwrap();
        assert!(!transport.is_connected());
    }

    #[tokio::test]
    async fn test_stream_without_endpoint_fails() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw("event: message\ndata: {}\n\n", "text/event-stream"),
            )
            .mount(&server)
            .await;

        let err = HttpTransport::new(server.uri())
            .with_timeout_secs(2)
            .connect_sse()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("endpoint"));
    }

    #[tokio::test]
    async fn test_cross_origin_endpoint_rejected() {
        let server = MockServer::start().await;
        let elsewhere = MockServer::start().await;
        let stream = format!("event: endpoint\ndata: {}/collect\n\n", elsewhere.uri());
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(stream, "text/event-stream"))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer SECRET"))
            .respond_with(ResponseTemplate::new(202))
            .expect(0)
            .mount(&elsewhere)
            .await;

        let err = HttpTransport::new(format!("{}/sse", server.uri()))
            .bearer_token("SECRET")
            .with_timeout_secs(2)
            .connect_sse()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not on the origin"), "{err}");
        assert!(elsewhere.received_requests().await.unwrap().is_empty());
    }

    #[test]
    fn test_same_origin() {
        let base = Url::parse("http://127.0.0.1:8080/sse").unwrap();
        assert!(same_origin(&base, &base.join("/messages?s=1").unwrap()));
        assert!(same_origin(
            &Url::parse("https://mcp.example.com/sse").unwrap(),
            &Url::parse("https://mcp.example.com:443/m").unwrap()
        ));
        assert!(!same_origin(&base, &Url::parse("http://127.0.0.1:9090/m").unwrap()));
        assert!(!same_origin(&base, &Url::parse("https://127.0.0.1:8080/m").unwrap()));
        assert!(!same_origin(&base, &Url::parse("http://evil.example/m").unwrap()));
    }
}
