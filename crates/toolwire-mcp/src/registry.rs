//! Server registry discovery
//!
//! [`RegistryClient`] searches an MCP server registry over its HTTP/JSON API
//! and turns the descriptors it returns into [`ServerConfig`] declarations.
//! npm packages launch through `npx -y`, PyPI packages through `uvx`, and
//! remote entries become HTTP servers.
//!
//! ```rust,ignore
//! let registry = RegistryClient::new(DEFAULT_REGISTRY_URL)?;
//! for server in registry.search("filesystem").await? {
//!     println!("{} - {}", server.name, server.description.as_deref().unwrap_or(""));
//! }
//! let config = registry.fetch("io.github.example/files").await?.to_config("files")?;
//! ```

use crate::config::{HttpVariant, ServerConfig};
use crate::protocol::{ConfigError, McpError};
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

pub const DEFAULT_REGISTRY_URL: &str = "https://registry.modelcontextprotocol.io";

/// One server as listed by the registry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerDescriptor {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub packages: Vec<PackageDescriptor>,
    #[serde(default)]
    pub remotes: Vec<RemoteDescriptor>,
}

/// An installable package for a server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PackageDescriptor {
    /// Package ecosystem, e.g. `npm` or `pypi`
    #[serde(alias = "registry_name", alias = "registryType")]
    pub registry: String,
    #[serde(alias = "identifier")]
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// A hosted endpoint for a server
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteDescriptor {
    #[serde(rename = "type", alias = "transport_type")]
    pub transport: String,
    pub url: String,
}

impl ServerDescriptor {
    /// Last segment of the registry name, e.g. `files` for `io.github.example/files`
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// Declaration launching this server. Packages are preferred over
    /// remotes; npm before pypi.
    pub fn to_config(&self, server_name: impl Into<String>) -> Result<ServerConfig, ConfigError> {
        let server_name = server_name.into();

        let package = |registry: &str| {
            self.packages
                .iter()
                .find(|p| p.registry.eq_ignore_ascii_case(registry))
        };
        if let Some(npm) = package("npm") {
            return Ok(ServerConfig::stdio(server_name, "npx", ["-y", npm.name.as_str()]));
        }
        if let Some(pypi) = package("pypi") {
            return Ok(ServerConfig::stdio(server_name, "uvx", [pypi.name.as_str()]));
        }

        for remote in &self.remotes {
            if let Some(variant) = HttpVariant::parse(&remote.transport) {
                let config =
                    ServerConfig::http(server_name, remote.url.as_str()).with_http_variant(variant);
                config.validate()?;
                return Ok(config);
            }
        }

        Err(ConfigError::NoLaunchMethod(self.name.clone()))
    }
}

/// Registry responses either list descriptors directly or wrap each one
#[derive(Deserialize)]
#[serde(untagged)]
enum Listed {
    Wrapped { server: ServerDescriptor },
    Bare(ServerDescriptor),
}

impl From<Listed> for ServerDescriptor {
    fn from(listed: Listed) -> Self {
        match listed {
            Listed::Wrapped { server } => server,
            Listed::Bare(server) => server,
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    servers: Vec<Listed>,
}

/// HTTP client for a server registry
#[derive(Debug, Clone)]
pub struct RegistryClient {
    base: Url,
    http: Client,
    limit: usize,
}

impl RegistryClient {
    pub fn new(base_url: &str) -> Result<Self, McpError> {
        let base = Url::parse(base_url).map_err(|e| ConfigError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| McpError::transport(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base,
            http,
            limit: 20,
        })
    }

    /// Maximum number of search results (default 20)
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<ServerDescriptor>, McpError> {
        let url = self.endpoint(&[])?;
        let limit = self.limit.to_string();
        let request = self
            .http
            .get(url)
            .query(&[("search", query), ("limit", limit.as_str())]);
        let response: SearchResponse = self.get_json(request).await?;

        let servers: Vec<ServerDescriptor> =
            response.servers.into_iter().map(Into::into).collect();
        debug!(query, found = servers.len(), "Registry search complete");
        Ok(servers)
    }

    #[instrument(skip(self))]
    pub async fn fetch(&self, id: &str) -> Result<ServerDescriptor, McpError> {
        let url = self.endpoint(&[id])?;
        let listed: Listed = self.get_json(self.http.get(url)).await?;
        Ok(listed.into())
    }

    /// `{base}/v0/servers[/segments...]`
    fn endpoint(&self, segments: &[&str]) -> Result<Url, McpError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| McpError::protocol(format!("registry URL cannot be a base: {}", self.base)))?
            .pop_if_empty()
            .extend(["v0", "servers"])
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, McpError> {
        let response = request
            .send()
            .await
            .map_err(|e| McpError::transport(format!("registry request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let url = response.url().clone();
            return Err(McpError::transport(format!(
                "registry returned {} for {}",
                status, url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| McpError::transport(format!("failed to read registry response: {}", e)))?;
        Ok(serde_json::from_str(&body)?)
    }
}
