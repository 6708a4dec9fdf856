//! Shared sessions
//!
//! [`ConnectionCache`] hands every caller asking for the same server the same
//! live client. Lookups take a read lock; a miss takes the write lock, checks
//! again, and only then connects, so concurrent first requests open exactly
//! one session. Entries live until [`ConnectionCache::shutdown`].

use crate::client::McpClient;
use crate::config::{ServerConfig, ServerKey};
use crate::connector::Connector;
use crate::protocol::{McpError, ServerIdentity};
use crate::readiness::ReadinessProber;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

#[derive(Default)]
struct CacheState {
    clients: HashMap<ServerKey, Arc<McpClient>>,
    identities: HashMap<ServerKey, ServerIdentity>,
    closed: bool,
}

pub struct ConnectionCache {
    connector: Arc<dyn Connector>,
    prober: Option<ReadinessProber>,
    state: RwLock<CacheState>,
}

impl ConnectionCache {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            prober: Some(ReadinessProber::default()),
            state: RwLock::new(CacheState::default()),
        }
    }

    /// Probe readiness of each new session with `prober`
    pub fn with_prober(mut self, prober: ReadinessProber) -> Self {
        self.prober = Some(prober);
        self
    }

    /// Hand out new sessions without probing them
    pub fn without_prober(mut self) -> Self {
        self.prober = None;
        self
    }

    /// The cached client for `config`, connecting on first use.
    ///
    /// A failed connect is not cached; the next call tries again.
    #[instrument(skip_all, fields(server = %config.name()))]
    pub async fn get_or_create(&self, config: &ServerConfig) -> Result<Arc<McpClient>, McpError> {
        let key = config.key();

        {
            let state = self.state.read().await;
            if state.closed {
                return Err(McpError::CacheClosed);
            }
            if let Some(client) = state.clients.get(&key) {
                return Ok(client.clone());
            }
        }

        let mut state = self.state.write().await;
        if state.closed {
            return Err(McpError::CacheClosed);
        }
        if let Some(client) = state.clients.get(&key) {
            debug!(key = %key, "Session opened by a concurrent caller");
            return Ok(client.clone());
        }

        let client = self
            .connector
            .connect(config)
            .await
            .map_err(|e| McpError::Connect {
                server: config.name().to_string(),
                source: Box::new(e),
            })?;
        if let Some(prober) = &self.prober {
            prober.wait(&client).await;
        }

        let client = Arc::new(client);
        if let Some(identity) = client.identity() {
            state.identities.insert(key.clone(), identity.clone());
        }
        state.clients.insert(key.clone(), client.clone());
        info!(key = %key, cached = state.clients.len(), "Cached MCP session");

        Ok(client)
    }

    /// Cached client, without connecting
    pub async fn get(&self, key: &ServerKey) -> Option<Arc<McpClient>> {
        self.state.read().await.clients.get(key).cloned()
    }

    /// Identity the server reported when its session was opened
    pub async fn identity(&self, key: &ServerKey) -> Option<ServerIdentity> {
        self.state.read().await.identities.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.clients.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn is_closed(&self) -> bool {
        self.state.read().await.closed
    }

    /// Close every cached session and refuse new ones
    pub async fn shutdown(&self) {
        let mut state = self.state.write().await;
        state.closed = true;
        state.identities.clear();
        let clients: Vec<_> = state.clients.drain().collect();
        drop(state);

        info!(sessions = clients.len(), "Shutting down MCP connection cache");
        for (key, client) in clients {
            if let Err(e) = client.close().await {
                warn!(key = %key, error = %e, "Failed to close MCP session");
            }
        }
    }
}

impl std::fmt::Debug for ConnectionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionCache")
            .field("prober", &self.prober)
            .finish_non_exhaustive()
    }
}
