//! Post-connect readiness polling
//!
//! Some servers answer the handshake before their tool backends are up. The
//! prober issues cheap requests until one succeeds. It is best effort: an
//! exhausted prober only logs, and callers keep the connection.

use crate::client::McpClient;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessProber {
    pub max_attempts: u32,
    pub interval: Duration,
}

impl Default for ReadinessProber {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            interval: Duration::from_millis(500),
        }
    }
}

impl ReadinessProber {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            interval,
        }
    }

    /// Poll until the server answers. Returns whether it ever did.
    pub async fn wait(&self, client: &McpClient) -> bool {
        let use_tools = client.identity().is_some_and(|i| i.supports_tools());
        let attempts = self.max_attempts.max(1);

        for attempt in 1..=attempts {
            let outcome = if use_tools {
                client.list_tools().await.map(|_| ())
            } else {
                client.ping().await
            };

            match outcome {
                Ok(()) => {
                    debug!(server = %client.label(), attempt, "MCP server ready");
                    return true;
                }
                Err(e) => {
                    debug!(server = %client.label(), attempt, error = %e, "MCP server not ready yet");
                    if attempt < attempts {
                        tokio::time::sleep(self.interval).await;
                    }
                }
            }
        }

        warn!(
            server = %client.label(),
            attempts,
            "MCP server did not become ready; continuing with the connection"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{initialize_result, Reply, ScriptedTransport};
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_ready_after_warmup() {
        let probes = Arc::new(AtomicU32::new(0));
        let counter = probes.clone();
        let transport = ScriptedTransport::new(move |method, _| match method {
            "initialize" => Reply::Result(initialize_result("warming")),
            "tools/list" if counter.fetch_add(1, Ordering::SeqCst) < 2 => Reply::Error {
                code: -32603,
                message: "server not ready".into(),
            },
            _ => Reply::Result(json!({"tools": []})),
        });
        let client = McpClient::connect(transport).await.unwrap();

        let prober = ReadinessProber::new(5, Duration::from_millis(1));
        assert!(prober.wait(&client).await);
        assert_eq!(probes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_ping_when_tools_not_advertised() {
        let transport = ScriptedTransport::new(|method, _| match method {
            "initialize" => Reply::Result(json!({
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "serverInfo": {"name": "bare"}
            })),
            "ping" => Reply::Result(json!({})),
            _ => Reply::Error {
                code: -32601,
                message: "Method not found".into(),
            },
        });
        let sent = transport.sent();
        let client = McpClient::connect(transport).await.unwrap();

        assert!(ReadinessProber::default().wait(&client).await);
        assert!(sent.lock().unwrap().iter().any(|m| m["method"] == "ping"));
    }

    #[tokio::test]
    async fn test_exhaustion_returns_false() {
        let transport = ScriptedTransport::new(|method, _| match method {
            "initialize" => Reply::Result(initialize_result("stuck")),
            _ => Reply::Error {
                code: -32603,
                message: "server not ready".into(),
            },
        });
        let client = McpClient::connect(transport).await.unwrap();

        let prober = ReadinessProber::new(3, Duration::from_millis(1));
        assert!(!prober.wait(&client).await);
    }
}
