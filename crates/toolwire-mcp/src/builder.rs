//! Declarative server assembly
//!
//! [`ConfigBuilder`] collects server declarations through chained calls.
//! Mistakes are recorded rather than returned, and reported all together by
//! [`ConfigBuilder::build`] or [`ConfigBuilder::build_lazy`].
//!
//! # Example
//!
//! ```rust,ignore
//! let cache = ConnectionCache::new(Arc::new(TransportConnector::new()));
//! let built = ConfigBuilder::new()
//!     .add_preset("memory", "memory")
//!     .add_server_url("docs", "https://mcp.example.com/mcp?token=abc")
//!     .add_server_url("git", "stdio://uvx?args=mcp-server-git").lazy()
//!     .build(&cache)
//!     .await?;
//! ```

use crate::cache::ConnectionCache;
use tokio_util::sync::CancellationToken;
use crate::config::{parse_env_entry, HttpVariant, ServerConfig, ServerKind};
use crate::presets::preset;
use crate::protocol::{ConfigError, McpError};
use crate::retry::{retry_with_policy, RetryPolicy, RetryingClient};
use reqwest::Url;
use serde_json::Value;
use std::collections::HashSet;
use std::path::Path;
use tracing::{error, info};

#[derive(Debug, Clone)]
struct Entry {
    config: ServerConfig,
    lazy: bool,
}

#[derive(Debug, Default)]
pub struct ConfigBuilder {
    entries: Vec<Entry>,
    errors: Vec<ConfigError>,
    names: HashSet<String>,
    policy: RetryPolicy,
    /// Whether the last declaration was accepted; `lazy`/`eager` apply to it
    last_accepted: bool,
}

/// A server connected by [`ConfigBuilder::build`]
#[derive(Debug)]
pub struct ConnectedServer {
    pub config: ServerConfig,
    pub client: RetryingClient,
}

/// A server [`ConfigBuilder::build`] could not connect
#[derive(Debug)]
pub struct ServerFailure {
    pub config: ServerConfig,
    pub error: McpError,
}

#[derive(Debug, Default)]
pub struct BuiltServers {
    pub connected: Vec<ConnectedServer>,
    /// Declarations marked lazy, untouched
    pub deferred: Vec<ServerConfig>,
    pub failures: Vec<ServerFailure>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read `{"servers": [...]}` or a bare array of server declarations.
    /// Entries may set `"lazy": true`.
    pub fn from_json(document: &str) -> Result<Self, McpError> {
        let value: Value = serde_json::from_str(document)
            .map_err(|e| ConfigError::Document(e.to_string()))?;
        let servers = match value {
            Value::Array(servers) => servers,
            Value::Object(mut object) => match object.remove("servers") {
                Some(Value::Array(servers)) => servers,
                _ => {
                    return Err(
                        ConfigError::Document("expected a \"servers\" array".into()).into()
                    )
                }
            },
            _ => {
                return Err(ConfigError::Document(
                    "expected an object or an array of servers".into(),
                )
                .into())
            }
        };

        let mut builder = Self::new();
        for (index, server) in servers.into_iter().enumerate() {
            let lazy = server.get("lazy").and_then(Value::as_bool).unwrap_or(false);
            match serde_json::from_value::<ServerConfig>(server) {
                Ok(config) => {
                    builder = builder.add_config(config);
                    if lazy {
                        builder = builder.lazy();
                    }
                }
                Err(e) => {
                    builder =
                        builder.reject(ConfigError::Document(format!("server #{}: {}", index, e)))
                }
            }
        }
        Ok(builder)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, McpError> {
        let document = std::fs::read_to_string(path)?;
        Self::from_json(&document)
    }

    pub fn add_stdio_server<I, S>(
        self,
        name: impl Into<String>,
        command: impl Into<String>,
        args: I,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_config(ServerConfig::stdio(name, command, args))
    }

    /// Stdio server with `KEY=VALUE` environment overrides
    pub fn add_stdio_server_with_env<I, S, E, V>(
        self,
        name: impl Into<String>,
        command: impl Into<String>,
        args: I,
        env: E,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        E: IntoIterator<Item = V>,
        V: AsRef<str>,
    {
        let mut config = ServerConfig::stdio(name, command, args);
        for entry in env {
            match parse_env_entry(entry.as_ref()) {
                Ok((key, value)) => config = config.with_env(key, value),
                Err(e) => return self.reject(e),
            }
        }
        self.add_config(config)
    }

    /// Streamable HTTP server; a `token` query parameter becomes the bearer token
    pub fn add_http_server(self, name: impl Into<String>, url: &str) -> Self {
        let name = name.into();
        let parsed = http_config(&name, url, None, None);
        self.add_parsed(parsed)
    }

    pub fn add_http_server_with_auth(
        self,
        name: impl Into<String>,
        url: &str,
        token: &str,
    ) -> Self {
        let name = name.into();
        let parsed = http_config(&name, url, None, Some(token));
        self.add_parsed(parsed)
    }

    /// Server speaking the HTTP+SSE sub-protocol
    pub fn add_sse_server(self, name: impl Into<String>, url: &str) -> Self {
        let name = name.into();
        let parsed = http_config(&name, url, Some(HttpVariant::Sse), None);
        self.add_parsed(parsed)
    }

    /// Compact form: `stdio://`, `http(s)://` or `mcp://<preset>`
    pub fn add_server_url(self, name: impl Into<String>, url: &str) -> Self {
        let parsed = parse_server_url(name, url);
        self.add_parsed(parsed)
    }

    pub fn add_preset(self, name: impl Into<String>, preset_name: &str) -> Self {
        let parsed = preset(preset_name)
            .map(|p| p.to_config(name))
            .ok_or_else(|| ConfigError::UnknownPreset(preset_name.to_string()));
        self.add_parsed(parsed)
    }

    pub fn add_config(mut self, config: ServerConfig) -> Self {
        if let Err(e) = config.validate() {
            return self.reject(e);
        }
        let config = if config.kind() == ServerKind::Http {
            match strip_url_credentials(&config) {
                Ok(stripped) => stripped,
                Err(e) => return self.reject(e),
            }
        } else {
            config
        };
        if !self.names.insert(config.name().to_string()) {
            return self.reject(ConfigError::DuplicateName(config.name().to_string()));
        }
        self.entries.push(Entry {
            config,
            lazy: false,
        });
        self.last_accepted = true;
        self
    }

    /// Defer the most recently added server
    pub fn lazy(mut self) -> Self {
        if self.last_accepted {
            if let Some(entry) = self.entries.last_mut() {
                entry.lazy = true;
            }
        }
        self
    }

    /// Connect the most recently added server at build time (the default)
    pub fn eager(mut self) -> Self {
        if self.last_accepted {
            if let Some(entry) = self.entries.last_mut() {
                entry.lazy = false;
            }
        }
        self
    }

    /// Policy for connecting at build time and for the returned clients
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Declaration errors recorded so far
    pub fn errors(&self) -> &[ConfigError] {
        &self.errors
    }

    fn add_parsed(self, parsed: Result<ServerConfig, ConfigError>) -> Self {
        match parsed {
            Ok(config) => self.add_config(config),
            Err(e) => self.reject(e),
        }
    }

    fn reject(mut self, error: ConfigError) -> Self {
        self.errors.push(error);
        self.last_accepted = false;
        self
    }

    fn check(self) -> Result<(Vec<Entry>, RetryPolicy), McpError> {
        if self.errors.is_empty() {
            Ok((self.entries, self.policy))
        } else {
            Err(McpError::ConfigErrors(self.errors))
        }
    }

    /// Connect every eager server through `cache`. A server that fails is
    /// reported in [`BuiltServers::failures`] and does not stop the others.
    pub async fn build(self, cache: &ConnectionCache) -> Result<BuiltServers, McpError> {
        let (entries, policy) = self.check()?;
        let cancel = CancellationToken::new();
        let mut built = BuiltServers::default();

        for Entry { config, lazy } in entries {
            if lazy {
                built.deferred.push(config);
                continue;
            }

            let label = format!("connect to '{}'", config.name());
            match retry_with_policy(&policy, &cancel, &label, || cache.get_or_create(&config)).await
            {
                Ok(client) => {
                    info!(server = %config.name(), "MCP server connected");
                    built.connected.push(ConnectedServer {
                        client: RetryingClient::new(client, policy.clone()),
                        config,
                    });
                }
                Err(error) => {
                    error!(server = %config.name(), error = %error, "Failed to connect MCP server");
                    built.failures.push(ServerFailure { config, error });
                }
            }
        }

        Ok(built)
    }

    /// Every declaration, eager or lazy, without connecting
    pub fn build_lazy(self) -> Result<Vec<ServerConfig>, McpError> {
        let (entries, _) = self.check()?;
        Ok(entries.into_iter().map(|e| e.config).collect())
    }
}

/// Parse a compact server URL
pub fn parse_server_url(name: impl Into<String>, url: &str) -> Result<ServerConfig, ConfigError> {
    let name = name.into();
    let (scheme, rest) = url.split_once("://").ok_or_else(|| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: "missing scheme".into(),
    })?;

    match scheme.to_ascii_lowercase().as_str() {
        "stdio" => parse_stdio_url(name, url, rest),
        "http" | "https" => http_config(&name, url, None, None),
        "mcp" => {
            let preset_name = rest.trim_end_matches('/');
            preset(preset_name)
                .map(|p| p.to_config(name))
                .ok_or_else(|| ConfigError::UnknownPreset(preset_name.to_string()))
        }
        other => Err(ConfigError::UnsupportedScheme(other.to_string())),
    }
}

fn parse_stdio_url(name: String, url: &str, rest: &str) -> Result<ServerConfig, ConfigError> {
    let (command, query) = rest.split_once('?').unwrap_or((rest, ""));
    if command.trim().is_empty() {
        return Err(ConfigError::EmptyCommand);
    }

    let mut args = Vec::new();
    let mut env = Vec::new();
    for (key, value) in query_pairs(url, query)? {
        match key.as_str() {
            "args" | "arg" => args.extend(
                value
                    .split(',')
                    .filter(|a| !a.is_empty())
                    .map(str::to_string),
            ),
            "env" => env.push(parse_env_entry(&value)?),
            _ => {}
        }
    }

    Ok(ServerConfig::stdio(name, command, args).with_envs(env))
}

/// Decode a query string into key/value pairs
fn query_pairs(url: &str, query: &str) -> Result<Vec<(String, String)>, ConfigError> {
    let mut scratch = Url::parse("stdio://local/").map_err(|e| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    scratch.set_query(Some(query));
    Ok(scratch
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect())
}

/// Build an HTTP declaration, moving `token` and `transport` query parameters
/// out of the dialed URL
fn http_config(
    name: &str,
    url: &str,
    variant: Option<HttpVariant>,
    token: Option<&str>,
) -> Result<ServerConfig, ConfigError> {
    let mut parsed = Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(ConfigError::UnsupportedScheme(other.to_string())),
    }

    let mut query_token = None;
    let mut query_variant = None;
    let mut kept = Vec::new();
    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "token" => query_token = Some(value.into_owned()),
            "transport" => {
                query_variant = Some(HttpVariant::parse(&value).ok_or_else(|| {
                    ConfigError::InvalidUrl {
                        url: redact(url),
                        reason: format!("unknown transport '{}'", value),
                    }
                })?)
            }
            _ => kept.push((key.into_owned(), value.into_owned())),
        }
    }

    if kept.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(&kept);
    }

    let mut config = ServerConfig::http(name, parsed.as_str())
        .with_http_variant(variant.or(query_variant).unwrap_or_default());
    if let Some(token) = token.map(str::to_string).or(query_token) {
        config = config.with_token(token);
    }
    Ok(config)
}

/// Re-derive an HTTP declaration so credentials in its URL move to the token
fn strip_url_credentials(config: &ServerConfig) -> Result<ServerConfig, ConfigError> {
    let url = config.url().unwrap_or_default();
    http_config(config.name(), url, config.declared_http_variant(), config.token())
}

/// URL text safe for error messages
fn redact(url: &str) -> String {
    match Url::parse(url) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.to_string()
        }
        Err(_) => url.to_string(),
    }
}
